//! Gemini web client
//!
//! An unofficial async client for the Gemini web app. It authenticates with
//! browser session cookies, keeps them fresh in the background, threads the
//! conversation state through successive turns, and decodes the app's
//! positional JSON replies into typed candidates and images.
//!
//! ```no_run
//! use gemini_web_client::{ClientOptions, GeminiClient};
//!
//! # async fn demo() -> gemini_web_client::Result<()> {
//! let client = GeminiClient::builder()
//!     .secure_1psid("...")
//!     .secure_1psidts("...")
//!     .build()?;
//! client.init(ClientOptions::default()).await?;
//!
//! let chat = client.start_chat().with_model("gemini-2.5-flash");
//! let reply = chat.send_message("Hello!", Vec::new()).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod gems;
pub mod models;
pub mod parsing;
pub mod session;
pub mod transport;
pub mod types;

pub use auth::{CookieCache, CredentialManager, Credentials, FileCookieCache, MemoryCookieCache};
pub use client::{ClientOptions, GeminiClient, GeminiClientBuilder, GenerateRequest};
pub use config::ClientConfig;
pub use error::{GeminiError, Result};
pub use gems::GemManager;
pub use models::{Model, ModelSpec};
pub use session::{ChatSession, ConversationState};
pub use types::{Candidate, Gem, GemJar, GeneratedImage, Image, ModelOutput, RpcData, WebImage};
