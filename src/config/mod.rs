//! Configuration system
//!
//! Handles loading configuration from multiple sources:
//! - Global config (platform config dir, `config.toml`)
//! - Project config (`./gemini-web.toml`)
//! - Environment variables (`GEMINI_*`)

use crate::auth::FileCookieCache;
use crate::client::ClientOptions;
use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

const PROJECT_CONFIG: &str = "gemini-web.toml";

/// Client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `__Secure-1PSID` cookie value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_1psid: Option<String>,

    /// `__Secure-1PSIDTS` cookie value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_1psidts: Option<String>,

    /// HTTP(S) or SOCKS proxy URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    pub timeout_secs: u64,
    pub auto_close: bool,
    pub close_delay_secs: u64,
    pub auto_refresh: bool,
    pub refresh_interval_secs: u64,
    pub verbose: bool,

    /// Where rotated cookies are cached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            secure_1psid: None,
            secure_1psidts: None,
            proxy: None,
            timeout_secs: 30,
            auto_close: false,
            close_delay_secs: 300,
            auto_refresh: true,
            refresh_interval_secs: 540,
            verbose: true,
            cookie_cache_dir: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("secure_1psid", &self.secure_1psid.as_ref().map(|_| "<REDACTED>"))
            .field(
                "secure_1psidts",
                &self.secure_1psidts.as_ref().map(|_| "<REDACTED>"),
            )
            .field("proxy", &self.proxy)
            .field("timeout_secs", &self.timeout_secs)
            .field("auto_close", &self.auto_close)
            .field("close_delay_secs", &self.close_delay_secs)
            .field("auto_refresh", &self.auto_refresh)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("verbose", &self.verbose)
            .field("cookie_cache_dir", &self.cookie_cache_dir)
            .finish()
    }
}

/// Partial config as read from a file; only keys present in the file
/// override earlier sources.
#[derive(Debug, Default, Deserialize)]
struct ConfigLayer {
    secure_1psid: Option<String>,
    secure_1psidts: Option<String>,
    proxy: Option<String>,
    timeout_secs: Option<u64>,
    auto_close: Option<bool>,
    close_delay_secs: Option<u64>,
    auto_refresh: Option<bool>,
    refresh_interval_secs: Option<u64>,
    verbose: Option<bool>,
    cookie_cache_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Load configuration from all sources (global, project, env)
    pub async fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            let content = fs::read_to_string(&global_path).await?;
            config = config.merge(toml::from_str(&content)?);
        }

        let project = PathBuf::from(PROJECT_CONFIG);
        if project.exists() {
            let content = fs::read_to_string(&project).await?;
            config = config.merge(toml::from_str(&content)?);
        }

        config.apply_env();
        Ok(config)
    }

    /// Parse a single TOML document on top of the defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(Self::default().merge(toml::from_str(content)?))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "gemini-web", "gemini-web-client")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write a default configuration file if none exists yet.
    pub async fn init_default() -> Result<Option<PathBuf>> {
        let Some(path) = Self::global_config_path() else {
            return Ok(None);
        };
        if path.exists() {
            tracing::info!(path = %path.display(), "Config already exists");
            return Ok(Some(path));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, toml::to_string_pretty(&Self::default())?).await?;
        tracing::info!(path = %path.display(), "Created config");
        Ok(Some(path))
    }

    /// Set one key and save the result to the global config file.
    pub async fn set(key: &str, value: &str) -> Result<()> {
        let mut config = Self::load().await?;
        config.set_value(key, value)?;

        let Some(path) = Self::global_config_path() else {
            anyhow::bail!("No config directory available on this platform");
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, toml::to_string_pretty(&config)?).await?;
        Ok(())
    }

    fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        };
        match key {
            "secure_1psid" => self.secure_1psid = optional(value),
            "secure_1psidts" => self.secure_1psidts = optional(value),
            "proxy" => self.proxy = optional(value),
            "timeout_secs" => self.timeout_secs = parse_secs(value)?,
            "auto_close" => self.auto_close = parse_bool(value)?,
            "close_delay_secs" => self.close_delay_secs = parse_secs(value)?,
            "auto_refresh" => self.auto_refresh = parse_bool(value)?,
            "refresh_interval_secs" => self.refresh_interval_secs = parse_secs(value)?,
            "verbose" => self.verbose = parse_bool(value)?,
            "cookie_cache_dir" => self.cookie_cache_dir = optional(value).map(PathBuf::from),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    fn merge(mut self, other: ConfigLayer) -> Self {
        if other.secure_1psid.is_some() {
            self.secure_1psid = other.secure_1psid;
        }
        if other.secure_1psidts.is_some() {
            self.secure_1psidts = other.secure_1psidts;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.cookie_cache_dir.is_some() {
            self.cookie_cache_dir = other.cookie_cache_dir;
        }
        self.timeout_secs = other.timeout_secs.unwrap_or(self.timeout_secs);
        self.auto_close = other.auto_close.unwrap_or(self.auto_close);
        self.close_delay_secs = other.close_delay_secs.unwrap_or(self.close_delay_secs);
        self.auto_refresh = other.auto_refresh.unwrap_or(self.auto_refresh);
        self.refresh_interval_secs = other
            .refresh_interval_secs
            .unwrap_or(self.refresh_interval_secs);
        self.verbose = other.verbose.unwrap_or(self.verbose);
        self
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("GEMINI_SECURE_1PSID") {
            self.secure_1psid = Some(val);
        }
        if let Ok(val) = std::env::var("GEMINI_SECURE_1PSIDTS") {
            self.secure_1psidts = Some(val);
        }
        if let Ok(val) = std::env::var("GEMINI_PROXY") {
            self.proxy = Some(val);
        }
        if let Ok(val) = std::env::var("GEMINI_COOKIE_PATH")
            && !val.trim().is_empty()
        {
            self.cookie_cache_dir = Some(PathBuf::from(val));
        }
    }

    /// Configured cache directory, or the platform default.
    pub fn cookie_cache_dir(&self) -> PathBuf {
        self.cookie_cache_dir
            .clone()
            .unwrap_or_else(FileCookieCache::default_dir)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            auto_close: self.auto_close,
            close_delay: Duration::from_secs(self.close_delay_secs),
            auto_refresh: self.auto_refresh,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            verbose: self.verbose,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid boolean value: {}", value),
    }
}

fn parse_secs(value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid number of seconds: {}", value))
}
