//! Gem management commands

use super::{Cli, GemsArgs, GemsCommand};
use crate::gems::GemManager;
use crate::types::Gem;
use anyhow::Result;
use std::time::Duration;

fn print_gem(gem: &Gem) {
    let origin = if gem.predefined { "system" } else { "custom" };
    println!("{}\t{}\t[{origin}]", gem.id, gem.name);
    if let Some(description) = gem.description.as_deref().filter(|d| !d.is_empty()) {
        println!("    {description}");
    }
}

pub async fn execute(cli: &Cli, args: GemsArgs) -> Result<()> {
    let (client, _config) = super::connect(cli).await?;

    let result = match args.command {
        GemsCommand::List { hidden, custom } => {
            client.fetch_gems(hidden).await.map(|jar| {
                let predefined = custom.then_some(false);
                let gems = jar.filter(predefined);
                if gems.is_empty() {
                    println!("No gems found");
                }
                for gem in gems {
                    print_gem(gem);
                }
            })
        }
        GemsCommand::Create {
            name,
            prompt,
            description,
        } => client
            .create_gem(&name, &prompt, &description)
            .await
            .map(|gem| print_gem(&gem)),
        GemsCommand::Update {
            id,
            name,
            prompt,
            description,
        } => client
            .update_gem(&id, &name, &prompt, &description)
            .await
            .map(|gem| print_gem(&gem)),
        GemsCommand::Delete { id } => client.delete_gem(&id).await.map(|()| {
            println!("Deleted gem {id}");
        }),
    };

    client.close(Duration::ZERO).await;
    Ok(result?)
}
