//! Rotating-cookie cache
//!
//! The rotating `__Secure-1PSIDTS` value is cached per primary session id
//! (`__Secure-1PSID`). The modification time of an entry doubles as the
//! rotation debounce clock.

use async_trait::async_trait;
use directories::ProjectDirs;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

const FILE_PREFIX: &str = ".cached_1psidts_";
const FILE_SUFFIX: &str = ".txt";

#[async_trait]
pub trait CookieCache: Send + Sync {
    /// Cached rotating cookie for `session_key`. Empty entries read as `None`.
    async fn read(&self, session_key: &str) -> io::Result<Option<String>>;

    async fn write(&self, session_key: &str, value: &str) -> io::Result<()>;

    /// When the entry was last written, if it exists.
    async fn modified_at(&self, session_key: &str) -> io::Result<Option<SystemTime>>;

    /// Every non-empty `(session_key, value)` pair in the cache.
    async fn entries(&self) -> io::Result<Vec<(String, String)>>;
}

/// One `.cached_1psidts_<1PSID>.txt` file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileCookieCache {
    dir: PathBuf,
}

impl FileCookieCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$GEMINI_COOKIE_PATH`, falling back to the platform data directory.
    pub fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("GEMINI_COOKIE_PATH")
            && !dir.trim().is_empty()
        {
            return PathBuf::from(dir);
        }
        ProjectDirs::from("com", "gemini-web", "gemini-web-client")
            .map(|dirs| dirs.data_dir().join("cookies"))
            .unwrap_or_else(|| std::env::temp_dir().join("gemini-web-cookies"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_key: &str) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{session_key}{FILE_SUFFIX}"))
    }
}

fn not_found_as_none<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CookieCache for FileCookieCache {
    async fn read(&self, session_key: &str) -> io::Result<Option<String>> {
        let content = not_found_as_none(fs::read_to_string(self.path_for(session_key)).await)?;
        Ok(content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }

    async fn write(&self, session_key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(session_key), value).await
    }

    async fn modified_at(&self, session_key: &str) -> io::Result<Option<SystemTime>> {
        let meta = not_found_as_none(fs::metadata(self.path_for(session_key)).await)?;
        meta.map(|m| m.modified()).transpose()
    }

    async fn entries(&self) -> io::Result<Vec<(String, String)>> {
        let Some(mut dir) = not_found_as_none(fs::read_dir(&self.dir).await)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            if let Some(value) = self.read(key).await? {
                out.push((key.to_string(), value));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Process-local cache, for callers that must not touch the disk.
#[derive(Debug, Default)]
pub struct MemoryCookieCache {
    entries: Mutex<HashMap<String, (String, SystemTime)>>,
}

impl MemoryCookieCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry with an explicit write time.
    pub fn insert_at(&self, session_key: &str, value: &str, written: SystemTime) {
        self.entries
            .lock()
            .insert(session_key.to_string(), (value.to_string(), written));
    }
}

#[async_trait]
impl CookieCache for MemoryCookieCache {
    async fn read(&self, session_key: &str) -> io::Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .get(session_key)
            .map(|(v, _)| v.clone())
            .filter(|v| !v.is_empty()))
    }

    async fn write(&self, session_key: &str, value: &str) -> io::Result<()> {
        self.insert_at(session_key, value, SystemTime::now());
        Ok(())
    }

    async fn modified_at(&self, session_key: &str) -> io::Result<Option<SystemTime>> {
        Ok(self.entries.lock().get(session_key).map(|(_, t)| *t))
    }

    async fn entries(&self) -> io::Result<Vec<(String, String)>> {
        let mut out: Vec<(String, String)> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, (v, _))| !v.is_empty())
            .map(|(k, (v, _))| (k.clone(), v.clone()))
            .collect();
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_cache_round_trips_and_lists_entries() {
        let dir = tempdir().unwrap();
        let cache = FileCookieCache::new(dir.path().join("nested"));

        assert_eq!(cache.read("psid-a").await.unwrap(), None);
        assert_eq!(cache.modified_at("psid-a").await.unwrap(), None);
        assert!(cache.entries().await.unwrap().is_empty());

        cache.write("psid-a", "ts-a").await.unwrap();
        cache.write("psid-b", "").await.unwrap();
        std::fs::write(dir.path().join("nested/unrelated.txt"), "x").unwrap();

        assert_eq!(cache.read("psid-a").await.unwrap().as_deref(), Some("ts-a"));
        assert_eq!(cache.read("psid-b").await.unwrap(), None);
        assert!(cache.modified_at("psid-a").await.unwrap().is_some());
        assert_eq!(
            cache.entries().await.unwrap(),
            vec![("psid-a".to_string(), "ts-a".to_string())]
        );
    }

    #[tokio::test]
    async fn memory_cache_tracks_write_time() {
        let cache = MemoryCookieCache::new();
        let then = SystemTime::UNIX_EPOCH;
        cache.insert_at("k", "v", then);
        assert_eq!(cache.modified_at("k").await.unwrap(), Some(then));
        cache.write("k", "v2").await.unwrap();
        assert!(cache.modified_at("k").await.unwrap().unwrap() > then);
    }
}
