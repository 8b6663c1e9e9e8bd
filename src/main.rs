//! gemini-web: command line front end for the Gemini web client
//!
//! Cookies come from the config file, the `GEMINI_SECURE_1PSID` /
//! `GEMINI_SECURE_1PSIDTS` environment variables or the `--psid` /
//! `--psidts` flags.

use clap::Parser;
use gemini_web_client::cli::{self, Cli, Command};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,gemini_web_client=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Ask(ref args) => cli::ask::execute(&cli, args.clone()).await,
        Command::Chat(ref args) => cli::chat::execute(&cli, args.clone()).await,
        Command::Gems(ref args) => cli::gems::execute(&cli, args.clone()).await,
        Command::Models => {
            cli::print_models();
            Ok(())
        }
        Command::Config(ref args) => cli::config::execute(args.clone()).await,
    }
}
