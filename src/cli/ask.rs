//! One-shot prompt

use super::{AskArgs, Cli};
use crate::client::GenerateRequest;
use crate::types::{Image, ModelOutput};
use anyhow::Result;
use serde_json::json;
use std::time::Duration;

pub async fn execute(cli: &Cli, args: AskArgs) -> Result<()> {
    let (client, _config) = super::connect(cli).await?;

    let mut request = GenerateRequest::new(args.prompt.join(" ")).with_files(args.files);
    if let Some(model) = args.model {
        request = request.with_model(model);
    }
    if let Some(gem) = args.gem {
        request = request.with_gem(gem);
    }

    let result = client.generate_content(request, None).await;
    client.close(Duration::ZERO).await;
    let output = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output_json(&output))?);
    } else {
        print_output(&output, args.thoughts);
    }
    Ok(())
}

pub(crate) fn output_json(output: &ModelOutput) -> serde_json::Value {
    json!({
        "metadata": output.metadata(),
        "chosen": output.chosen_index(),
        "candidates": output.candidates(),
    })
}

pub(crate) fn print_output(output: &ModelOutput, thoughts: bool) {
    if thoughts && let Some(t) = output.thoughts() {
        println!("[thoughts]\n{t}\n");
    }
    println!("{output}");
    for image in output.images() {
        let kind = match &image {
            Image::Web(_) => "web",
            Image::Generated(_) => "generated",
        };
        println!("  [{kind}] {} {}", image.title(), image.url());
    }
    if output.candidates().len() > 1 {
        println!(
            "({} candidates, showing {})",
            output.candidates().len(),
            output.chosen_index()
        );
    }
}
