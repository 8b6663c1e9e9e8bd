//! Interactive chat on stdin
//!
//! Lines are sent as turns. `:candidate N` keeps another candidate of the
//! last reply, `:meta` prints the conversation triple, `:quit` exits.

use super::{ChatArgs, Cli};
use crate::session::ChatSession;
use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

enum Input<'a> {
    Prompt(&'a str),
    Candidate(usize),
    Meta,
    Quit,
    Invalid(String),
}

fn parse_input(line: &str) -> Option<Input<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Some(Input::Prompt(line));
    };
    let mut parts = command.split_whitespace();
    Some(match (parts.next(), parts.next()) {
        (Some("quit" | "q" | "exit"), _) => Input::Quit,
        (Some("meta"), _) => Input::Meta,
        (Some("candidate" | "c"), Some(n)) => match n.parse() {
            Ok(index) => Input::Candidate(index),
            Err(_) => Input::Invalid(format!("Not a candidate index: {n}")),
        },
        _ => Input::Invalid(format!("Unknown command: {line}")),
    })
}

pub async fn execute(cli: &Cli, args: ChatArgs) -> Result<()> {
    let (client, _config) = super::connect(cli).await?;

    let mut chat = client.start_chat();
    if let Some(model) = args.model {
        chat = chat.with_model(model);
    }
    if let Some(gem) = args.gem {
        chat = chat.with_gem(gem);
    }
    if let Some(cid) = args.cid {
        chat = chat.with_cid(cid);
    }
    if let Some(rid) = args.rid {
        chat = chat.with_rid(rid);
    }
    if let Some(rcid) = args.rcid {
        chat = chat.with_rcid(rcid);
    }

    let result = run_loop(&chat).await;
    client.close(Duration::ZERO).await;
    result
}

async fn run_loop(chat: &ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            None => continue,
            Some(Input::Quit) => break,
            Some(Input::Meta) => {
                let meta = chat.metadata().await;
                println!("{}", meta.to_value());
            }
            Some(Input::Invalid(msg)) => eprintln!("{msg}"),
            Some(Input::Candidate(index)) => match chat.choose_candidate(index).await {
                Ok(output) => super::ask::print_output(&output, false),
                Err(e) => eprintln!("{e}"),
            },
            Some(Input::Prompt(prompt)) => match chat.send_message(prompt, Vec::new()).await {
                Ok(output) => super::ask::print_output(&output, false),
                Err(e) => {
                    eprintln!("{e}");
                    if !chat.client().is_running() {
                        anyhow::bail!("Session closed: {e}");
                    }
                }
            },
        }
    }
    Ok(())
}
