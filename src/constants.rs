//! Endpoints, RPC method ids, header sets and remote error codes.
//!
//! These values are dictated by the Gemini web app and must match it exactly.

pub const GOOGLE_URL: &str = "https://www.google.com";
pub const INIT_URL: &str = "https://gemini.google.com/app";
pub const GENERATE_URL: &str =
    "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";
pub const ROTATE_COOKIES_URL: &str = "https://accounts.google.com/RotateCookies";
pub const UPLOAD_URL: &str = "https://content-push.googleapis.com/upload";
pub const BATCH_EXEC_URL: &str = "https://gemini.google.com/_/BardChatUi/data/batchexecute";

/// Primary session cookie. Its value keys the rotating-cookie cache.
pub const SECURE_1PSID: &str = "__Secure-1PSID";
/// Secondary session cookie, refreshed through [`ROTATE_COOKIES_URL`].
pub const SECURE_1PSIDTS: &str = "__Secure-1PSIDTS";

/// Body the rotation endpoint expects, byte for byte.
pub const ROTATE_COOKIES_BODY: &str = r#"[000,"-0000000000000000000"]"#;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Header carrying the model selector.
pub const MODEL_HEADER_KEY: &str = "x-goog-ext-525001261-jspb";

/// batchexecute method ids.
pub mod rpc {
    pub const LIST_GEMS: &str = "CNgdBe";
    pub const CREATE_GEM: &str = "oMH3Zd";
    pub const UPDATE_GEM: &str = "kHv0Vd";
    pub const DELETE_GEM: &str = "UXcSJb";
}

/// Headers sent with every request to gemini.google.com.
pub fn gemini_headers() -> Vec<(String, String)> {
    [
        (
            "Content-Type",
            "application/x-www-form-urlencoded;charset=utf-8",
        ),
        ("Host", "gemini.google.com"),
        ("Origin", "https://gemini.google.com"),
        ("Referer", "https://gemini.google.com/"),
        ("User-Agent", USER_AGENT),
        ("X-Same-Domain", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn rotate_cookies_headers() -> Vec<(String, String)> {
    vec![("Content-Type".to_string(), "application/json".to_string())]
}

pub fn upload_headers() -> Vec<(String, String)> {
    vec![("Push-ID".to_string(), "feeds/mcudyrk2a4khkz".to_string())]
}

/// Error codes reported inside an otherwise well-formed generate response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    TemporaryError = 1013,
    UsageLimitExceeded = 1037,
    ModelInconsistent = 1050,
    ModelHeaderInvalid = 1052,
    IpTemporarilyBlocked = 1060,
}

impl ErrorCode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1013 => Some(Self::TemporaryError),
            1037 => Some(Self::UsageLimitExceeded),
            1050 => Some(Self::ModelInconsistent),
            1052 => Some(Self::ModelHeaderInvalid),
            1060 => Some(Self::IpTemporarilyBlocked),
            _ => None,
        }
    }
}
