//! CLI command definitions and handlers

pub mod ask;
pub mod chat;
pub mod config;
pub mod gems;

use crate::client::GeminiClient;
use crate::config::ClientConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gemini web client
///
/// Talks to gemini.google.com with your browser session cookies.
#[derive(Parser, Debug, Clone)]
#[command(name = "gemini-web")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Raise log output to debug for this crate
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// `__Secure-1PSID` cookie (overrides config)
    #[arg(long, global = true, env = "GEMINI_SECURE_1PSID", hide_env_values = true)]
    pub psid: Option<String>,

    /// `__Secure-1PSIDTS` cookie (overrides config)
    #[arg(long, global = true, env = "GEMINI_SECURE_1PSIDTS", hide_env_values = true)]
    pub psidts: Option<String>,

    /// Proxy URL (overrides config)
    #[arg(long, global = true, env = "GEMINI_PROXY")]
    pub proxy: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Send a single prompt and print the reply
    Ask(AskArgs),

    /// Interactive multi-turn conversation on stdin
    Chat(ChatArgs),

    /// Manage gems
    Gems(GemsArgs),

    /// List the built-in models
    Models,

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct AskArgs {
    /// Prompt text
    #[arg(required = true)]
    pub prompt: Vec<String>,

    /// Model name (see `gemini-web models`)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Gem id to answer with
    #[arg(short, long)]
    pub gem: Option<String>,

    /// Files to attach
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,

    /// Print the model's thoughts, when present
    #[arg(long)]
    pub thoughts: bool,

    /// Print the decoded reply as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ChatArgs {
    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(short, long)]
    pub gem: Option<String>,

    /// Continue an existing conversation id
    #[arg(long)]
    pub cid: Option<String>,

    #[arg(long, requires = "cid")]
    pub rid: Option<String>,

    #[arg(long, requires = "cid")]
    pub rcid: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct GemsArgs {
    #[command(subcommand)]
    pub command: GemsCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GemsCommand {
    /// List gems
    List {
        /// Include predefined gems the web app hides
        #[arg(long)]
        hidden: bool,

        /// Only list your own gems
        #[arg(long)]
        custom: bool,
    },

    /// Create a custom gem
    Create {
        name: String,

        /// System prompt
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Update a custom gem
    Update {
        id: String,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Delete a custom gem
    Delete { id: String },
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Initialize default configuration
    #[arg(long)]
    pub init: bool,

    /// Set a configuration value
    #[arg(long)]
    pub set: Option<String>,
}

/// Load config, apply the global flags and return an initialized client.
pub(crate) async fn connect(cli: &Cli) -> Result<(GeminiClient, ClientConfig)> {
    let mut config = ClientConfig::load().await.context("Failed to load config")?;
    if let Some(psid) = &cli.psid {
        config.secure_1psid = Some(psid.clone());
    }
    if let Some(psidts) = &cli.psidts {
        config.secure_1psidts = Some(psidts.clone());
    }
    if let Some(proxy) = &cli.proxy {
        config.proxy = Some(proxy.clone());
    }

    let client = GeminiClient::from_config(&config)?;
    client
        .init(config.client_options())
        .await
        .context("Failed to initialize Gemini client")?;
    Ok((client, config))
}

pub fn print_models() {
    for model in crate::models::Model::all() {
        match model.headers.values().next() {
            Some(header) => println!("{}\t{}", model.name, header),
            None => println!("{}", model.name),
        }
    }
}
