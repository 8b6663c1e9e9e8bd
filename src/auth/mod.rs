//! Cookie based credential lifecycle
//!
//! There is no API key. A session is a set of browser cookies from which
//! an access token is scraped off the app's init page. Whether a cookie set
//! is still valid can only be learned with a live round trip, so
//! [`CredentialManager::acquire_token`] walks an ordered list of candidate
//! cookie sets and keeps the first one that yields a token.
//!
//! The secondary cookie (`__Secure-1PSIDTS`) expires quickly and has to be
//! rotated in the background; [`CredentialManager::rotate`] does one
//! debounced rotation and caches the result.

pub mod cache;

use crate::constants::{
    GOOGLE_URL, INIT_URL, ROTATE_COOKIES_BODY, ROTATE_COOKIES_URL, SECURE_1PSID, SECURE_1PSIDTS,
    gemini_headers, rotate_cookies_headers,
};
use crate::error::{GeminiError, Result};
use crate::transport::{HttpRequest, Transport};
use crate::types::Cookies;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

pub use cache::{CookieCache, FileCookieCache, MemoryCookieCache};

/// A rotation is skipped when the cache entry is younger than this.
pub const ROTATION_DEBOUNCE: Duration = Duration::from_secs(60);

/// Access token plus the cookie set it was scraped with.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub cookies: Cookies,
    /// Build label (`cfb2h`), sent as `bl` when present.
    pub build_label: Option<String>,
    /// Frontend session id (`FdrFJe`), sent as `f.sid` when present.
    pub session_id: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[redacted]")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("build_label", &self.build_label)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Tokens scraped from the init page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTokens {
    pub access_token: String,
    pub build_label: Option<String>,
    pub session_id: Option<String>,
}

/// Pull the access token (`SNlM0e`, or `thykhd` on newer pages) and the
/// optional build label / session id out of the init page HTML.
pub fn extract_page_tokens(html: &str) -> Option<PageTokens> {
    static RE_AT: OnceLock<Regex> = OnceLock::new();
    static RE_AT_NEW: OnceLock<Regex> = OnceLock::new();
    static RE_BL: OnceLock<Regex> = OnceLock::new();
    static RE_SID: OnceLock<Regex> = OnceLock::new();

    let re_at = RE_AT.get_or_init(|| Regex::new(r#""SNlM0e":"(.*?)""#).unwrap());
    let re_at_new = RE_AT_NEW.get_or_init(|| Regex::new(r#""thykhd":"([^"]+)""#).unwrap());
    let re_bl = RE_BL.get_or_init(|| Regex::new(r#""cfb2h":"([^"]+)""#).unwrap());
    let re_sid = RE_SID.get_or_init(|| Regex::new(r#""FdrFJe":"([^"]+)""#).unwrap());

    let capture = |re: &Regex| {
        re.captures(html)
            .map(|c| c[1].to_string())
            .filter(|v| !v.is_empty())
    };

    let access_token = capture(re_at).or_else(|| capture(re_at_new))?;
    Some(PageTokens {
        access_token,
        build_label: capture(re_bl),
        session_id: capture(re_sid),
    })
}

/// Where a candidate cookie set came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateSource {
    Seed,
    Cached,
    CacheScan,
}

pub struct CredentialManager {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CookieCache>,
    verbose: bool,
    timeout: Option<Duration>,
}

impl CredentialManager {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn CookieCache>) -> Self {
        Self {
            transport,
            cache,
            verbose: false,
            timeout: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Deadline for every request this manager sends. Without one the
    /// transport's own default applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn deadline(&self, request: HttpRequest) -> HttpRequest {
        match self.timeout {
            Some(timeout) => request.with_timeout(timeout),
            None => request,
        }
    }

    /// Cookies google.com hands to an anonymous visitor. Failures are ignored.
    async fn anonymous_cookies(&self) -> Cookies {
        match self.transport.send(self.deadline(HttpRequest::get(GOOGLE_URL))).await {
            Ok(resp) if resp.status == 200 => resp.cookies,
            Ok(resp) => {
                tracing::debug!(status = resp.status, "Anonymous cookie fetch returned non-200");
                Cookies::new()
            }
            Err(e) => {
                tracing::debug!(error = %e, "Anonymous cookie fetch failed");
                Cookies::new()
            }
        }
    }

    /// Ordered candidate cookie sets: seed, then cached rotation for the
    /// seed's session, then (without a seed session id) every cache entry.
    async fn candidates(&self, seed: &Cookies) -> Vec<(CandidateSource, Cookies)> {
        let extra = self.anonymous_cookies().await;
        let merged = |overrides: &Cookies| {
            let mut cookies = extra.clone();
            cookies.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            cookies
        };

        let mut out = Vec::new();
        if seed.contains_key(SECURE_1PSID) && seed.contains_key(SECURE_1PSIDTS) {
            out.push((CandidateSource::Seed, merged(seed)));
        } else if self.verbose {
            tracing::debug!(
                "Skipping base cookies. Either __Secure-1PSID or __Secure-1PSIDTS is not provided."
            );
        }

        if let Some(psid) = seed.get(SECURE_1PSID) {
            match self.cache.read(psid).await {
                Ok(Some(cached)) => {
                    let mut cookies = merged(seed);
                    cookies.insert(SECURE_1PSIDTS.to_string(), cached);
                    out.push((CandidateSource::Cached, cookies));
                }
                Ok(None) if self.verbose => {
                    tracing::debug!("Skipping cached cookies. No cache entry for this session.");
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "Failed to read cached cookies"),
            }
        } else {
            match self.cache.entries().await {
                Ok(entries) => {
                    if entries.is_empty() && self.verbose {
                        tracing::debug!(
                            "Skipping cached cookies. Cookies will be cached after successful initialization."
                        );
                    }
                    for (psid, psidts) in entries {
                        let mut cookies = extra.clone();
                        cookies.insert(SECURE_1PSID.to_string(), psid);
                        cookies.insert(SECURE_1PSIDTS.to_string(), psidts);
                        out.push((CandidateSource::CacheScan, cookies));
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Failed to list cached cookies"),
            }
        }
        out
    }

    /// Probe the init page with one candidate set.
    async fn probe(&self, cookies: Cookies) -> Result<Option<Credentials>> {
        let request = self.deadline(
            HttpRequest::get(INIT_URL)
                .with_headers(gemini_headers())
                .with_cookies(&cookies),
        );
        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.into_gemini("Init page request timed out."))?;
        if resp.status >= 400 {
            return Err(GeminiError::Api(format!(
                "Request failed with status {}",
                resp.status
            )));
        }

        let Some(tokens) = extract_page_tokens(&resp.body) else {
            return Ok(None);
        };
        let mut merged = cookies;
        merged.extend(resp.cookies);
        Ok(Some(Credentials {
            access_token: tokens.access_token,
            cookies: merged,
            build_label: tokens.build_label,
            session_id: tokens.session_id,
        }))
    }

    /// Find a cookie set the server accepts and return its access token.
    pub async fn acquire_token(&self, seed: &Cookies) -> Result<Credentials> {
        let candidates = self.candidates(seed).await;
        if candidates.is_empty() {
            return Err(GeminiError::Auth(
                "No valid cookies available for initialization. \
                 Please pass __Secure-1PSID and __Secure-1PSIDTS manually."
                    .to_string(),
            ));
        }

        let total = candidates.len();
        for (i, (source, cookies)) in candidates.into_iter().enumerate() {
            let attempt = i + 1;
            match self.probe(cookies).await {
                Ok(Some(credentials)) => {
                    if self.verbose {
                        tracing::debug!(attempt, total, ?source, "Init attempt succeeded");
                    }
                    return Ok(credentials);
                }
                Ok(None) => {
                    if self.verbose {
                        tracing::debug!(attempt, total, ?source, "Init attempt failed. Cookies invalid.");
                    }
                }
                Err(e) => {
                    if self.verbose {
                        tracing::debug!(attempt, total, ?source, error = %e, "Init attempt failed");
                    }
                }
            }
        }

        Err(GeminiError::Auth(format!(
            "Failed to initialize client. SECURE_1PSIDTS could get expired frequently, \
             please make sure cookie values are up to date. (Failed initialization attempts: {total})"
        )))
    }

    /// Rotate `__Secure-1PSIDTS` once.
    ///
    /// Returns `Ok(None)` without any network traffic when the cache entry
    /// for this session was written within [`ROTATION_DEBOUNCE`], and also
    /// when the server answered without a new cookie. A 401 is an
    /// [`GeminiError::Auth`]; everything else is transient.
    pub async fn rotate(&self, cookies: &Cookies) -> Result<Option<String>> {
        let psid = cookies.get(SECURE_1PSID).ok_or_else(|| {
            GeminiError::Auth("__Secure-1PSID is required to rotate cookies".to_string())
        })?;

        if let Some(modified) = self.cache.modified_at(psid).await? {
            let fresh = SystemTime::now()
                .duration_since(modified)
                .map(|age| age <= ROTATION_DEBOUNCE)
                .unwrap_or(true);
            if fresh {
                tracing::debug!("Cookie cache written recently; skipping rotation");
                return Ok(None);
            }
        }

        let request = self.deadline(
            HttpRequest::post_raw(ROTATE_COOKIES_URL, ROTATE_COOKIES_BODY)
                .with_headers(rotate_cookies_headers())
                .with_cookies(cookies),
        );
        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.into_gemini("Cookie rotation timed out."))?;

        match resp.status {
            401 => return Err(GeminiError::Auth("Cookie rotation was rejected (401)".to_string())),
            s if s >= 400 => {
                return Err(GeminiError::Api(format!(
                    "Cookie rotation failed with status {s}"
                )));
            }
            _ => {}
        }

        let Some(new_psidts) = resp.cookies.get(SECURE_1PSIDTS).cloned() else {
            return Ok(None);
        };
        self.cache.write(psid, &new_psidts).await?;
        Ok(Some(new_psidts))
    }
}
