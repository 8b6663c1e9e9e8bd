//! HTTP transport seam
//!
//! The client never talks to reqwest directly. Every call goes through the
//! [`Transport`] trait so the session logic can run against a scripted
//! transport in tests. Cookies travel explicitly on each request and the
//! cookies the server sets come back on the response, which keeps the
//! cookie lifecycle visible to the credential manager.

pub mod upload;

use crate::constants::USER_AGENT;
use crate::error::{GeminiError, Result};
use crate::types::Cookies;
use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;

pub use upload::{FileUploader, ReqwestUploader, validate_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Cookies,
    pub body: Option<RequestBody>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            cookies: Cookies::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            body: Some(RequestBody::Form(fields)),
            ..Self::get(url)
        }
    }

    pub fn post_raw(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            body: Some(RequestBody::Raw(body.into())),
            ..Self::get(url)
        }
    }

    /// Add headers; a later header replaces an earlier one with the same
    /// (case-insensitive) name.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            let k = k.into();
            self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&k));
            self.headers.push((k, v.into()));
        }
        self
    }

    pub fn with_cookies(mut self, cookies: &Cookies) -> Self {
        self.cookies.extend(cookies.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn form_field(&self, name: &str) -> Option<&str> {
        match &self.body {
            Some(RequestBody::Form(fields)) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Cookies the server set during the exchange, redirect hops included.
    pub cookies: Cookies,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            cookies: Cookies::new(),
        }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Map onto the public taxonomy, using `timeout_message` for deadlines.
    pub fn into_gemini(self, timeout_message: &str) -> GeminiError {
        match self {
            TransportError::Timeout => GeminiError::Timeout(timeout_message.to_string()),
            TransportError::Other(msg) => GeminiError::Transport(msg),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Sends one request and returns the full response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Settings shared by the reqwest backed collaborators.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Hops [`ReqwestTransport`] follows before giving up.
pub const MAX_REDIRECTS: usize = 5;

pub(crate) fn build_http_client(options: &TransportOptions, redirect: Policy) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .timeout(options.timeout)
        .redirect(redirect);
    if let Some(proxy) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| GeminiError::InvalidInput(format!("Invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| GeminiError::Transport(format!("Failed to build HTTP client: {e}")))
}

/// `name=value; name2=value2`
pub fn cookie_header(cookies: &Cookies) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Name and value from a `Set-Cookie` header, ignoring attributes.
pub fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Pooled reqwest client. Proxy and default timeout are fixed at
/// construction; a request may carry a tighter timeout of its own.
///
/// Redirects are followed here rather than by reqwest: each hop is sent
/// with the cookies accumulated so far, so a `Set-Cookie` on a 302 reaches
/// the next hop and the caller.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(options: &TransportOptions) -> Result<Self> {
        Ok(Self {
            client: build_http_client(options, Policy::none())?,
        })
    }

    /// Wrap an existing client. It must not follow redirects on its own.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn header_map(headers: &[(String, String)], cookies: &Cookies) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            match (HeaderName::try_from(k.as_str()), HeaderValue::try_from(v.as_str())) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::warn!(header = %k, "Dropping header that is not valid HTTP"),
            }
        }
        if !cookies.is_empty()
            && let Ok(value) = HeaderValue::try_from(cookie_header(cookies))
        {
            map.insert(COOKIE, value);
        }
        map
    }

    async fn exchange(
        &self,
        request: &HttpRequest,
        hop: &Hop,
        cookies: &Cookies,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let mut builder = match hop.method {
            Method::Get => self.client.get(hop.url.clone()),
            Method::Post => self.client.post(hop.url.clone()),
        };
        builder = match &hop.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Raw(body)) => builder.body(body.clone()),
            None => builder,
        };
        // Applied after the body so explicit headers win over the defaults
        // reqwest derives from it.
        builder = builder.headers(Self::header_map(&request.headers, cookies));
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.send().await?)
    }
}

/// Where the next request of a redirect chain goes.
struct Hop {
    method: Method,
    url: Url,
    body: Option<RequestBody>,
}

impl Hop {
    /// 301/302/303 turn a POST into a bodiless GET; 307/308 replay it.
    fn follow(self, status: u16, url: Url) -> Self {
        if matches!(status, 301..=303) && self.method == Method::Post {
            Self {
                method: Method::Get,
                url,
                body: None,
            }
        } else {
            Self { url, ..self }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::Other(format!("Invalid URL {}: {e}", request.url)))?;
        let mut hop = Hop {
            method: request.method,
            url,
            body: request.body.clone(),
        };
        let mut jar = request.cookies.clone();
        let mut set_cookies = Cookies::new();

        for _ in 0..=MAX_REDIRECTS {
            let resp = self.exchange(&request, &hop, &jar).await?;
            let status = resp.status().as_u16();
            for (name, value) in resp
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .filter_map(parse_set_cookie)
            {
                jar.insert(name.clone(), value.clone());
                set_cookies.insert(name, value);
            }

            let location = resp
                .status()
                .is_redirection()
                .then(|| resp.headers().get(LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok());
            if let Some(location) = location {
                let next = resp.url().join(location).map_err(|e| {
                    TransportError::Other(format!("Invalid redirect location {location}: {e}"))
                })?;
                tracing::debug!(from = %hop.url, to = %next, status, "Following redirect");
                hop = hop.follow(status, next);
                continue;
            }

            tracing::debug!(url = %request.url, status, set_cookies = set_cookies.len(), "HTTP exchange finished");
            let body = resp.text().await?;
            return Ok(HttpResponse {
                status,
                body,
                cookies: set_cookies,
            });
        }
        Err(TransportError::Other(format!(
            "Too many redirects (more than {MAX_REDIRECTS}) from {}",
            request.url
        )))
    }
}
