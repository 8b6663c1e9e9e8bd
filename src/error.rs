//! Error taxonomy for the Gemini web client
//!
//! Every fallible public operation returns [`GeminiError`]. Parsing and
//! decoding failures never escape as their own kind: the orchestrator maps
//! them onto one of the variants below, logging the raw payload at debug
//! level only.

use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Error, Debug)]
pub enum GeminiError {
    /// No usable credentials, or the cookie rotation endpoint rejected them.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-200 status or an undecodable body. The session has been closed.
    #[error("{0}")]
    Api(String),

    /// The transport deadline elapsed.
    #[error("{0}")]
    Timeout(String),

    /// Text was produced but the generated image payload never arrived.
    #[error("{0}")]
    ImageGeneration(String),

    #[error("{0}")]
    UsageLimitExceeded(String),

    /// The model selector is unknown, unavailable, or inconsistent with the
    /// conversation history.
    #[error("{0}")]
    ModelInvalid(String),

    #[error("{0}")]
    TemporarilyBlocked(String),

    /// The client was never initialised or has been closed.
    #[error("Client not initialized. Call init() first.")]
    NotInitialized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index {index} exceeds the number of candidates ({len})")]
    CandidateOutOfRange { index: usize, len: usize },

    /// Any other transport level failure (DNS, TLS, connection reset).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeminiError {
    /// Whether the cookie refresh loop must stop after seeing this error.
    pub fn is_terminal_for_refresh(&self) -> bool {
        matches!(self, GeminiError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, GeminiError>;
