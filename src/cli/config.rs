//! Configuration management commands

use super::ConfigArgs;
use crate::config::ClientConfig;
use anyhow::Result;

pub async fn execute(args: ConfigArgs) -> Result<()> {
    if args.show {
        let config = ClientConfig::load().await?;
        println!("{config:#?}");
        return Ok(());
    }

    if args.init {
        match ClientConfig::init_default().await? {
            Some(path) => println!("Configuration initialized at {}", path.display()),
            None => println!("No config directory available on this platform"),
        }
        return Ok(());
    }

    if let Some(kv) = args.set {
        let Some((key, value)) = kv.split_once('=') else {
            anyhow::bail!("Invalid format. Use: --set key=value");
        };
        ClientConfig::set(key, value).await?;
        if key.starts_with("secure_") {
            println!("Set {key}");
        } else {
            println!("Set {key} = {value}");
        }
        return Ok(());
    }

    println!("Use --show, --init, or --set key=value");
    Ok(())
}
