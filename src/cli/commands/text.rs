//! Extraction over saved OCR text, for regression checks against
//! diagnostics files.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tracing::info;

use lienscan::{Config, Pipeline};

use crate::cli::helpers::truncate;

pub async fn cmd_text(
    config: &Config,
    file: &Path,
    show_trace: bool,
    show_normalized: bool,
) -> anyhow::Result<()> {
    let raw = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?
    };
    info!("Read {} chars: {}", raw.len(), truncate(raw.trim(), 60));

    let pipeline = Arc::new(Pipeline::from_config(config).context("Failed to build pipeline")?);
    // The LLM polisher blocks on the runtime, so run off the async workers.
    let found = tokio::task::spawn_blocking(move || pipeline.extract_text(&raw))
        .await
        .context("Extraction task failed")?;

    if show_normalized {
        println!("{}", style("--- NORMALIZED TEXT ---").cyan());
        println!("{}\n", found.normalized_text);
    }

    match &found.address {
        Some(address) => {
            println!(
                "{} {} {}",
                style("✓").green(),
                style(&address.text).bold(),
                style(format!("[{}]", found.method_used)).dim()
            );
            if address.had_person_name_removed {
                println!("    {}", style("person name removed").dim());
            }
        }
        None => println!(
            "{} no address {}",
            style("✗").red(),
            style(format!("[{}]", found.method_used)).dim()
        ),
    }

    if show_trace {
        println!("\n{}", style("--- PATTERN TRACE ---").cyan());
        print!("{}", found.trace.render());
    }
    Ok(())
}
