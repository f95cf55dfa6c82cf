//! Shared helper functions for CLI commands.

use std::path::Path;

use anyhow::Context;
use console::style;

use lienscan::{Config, ExtractionResult};

/// Load configuration from an explicit path, or discover it.
pub async fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(Config::load().await),
    }
}

/// Truncate a string to `max_chars` characters, appending "..." if cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// One human-readable line (plus artifact path) per result.
pub fn print_result(result: &ExtractionResult) {
    match result.address_text() {
        Some(address) => {
            let scrubbed = if result.address.as_ref().is_some_and(|a| a.had_person_name_removed) {
                style(" (name removed)").dim().to_string()
            } else {
                String::new()
            };
            println!(
                "{} {}: {} {}{}",
                style("✓").green(),
                result.document_identifier,
                style(address).bold(),
                style(format!("[{}]", result.method_used)).dim(),
                scrubbed
            );
        }
        None => println!(
            "{} {}: no address {}",
            style("✗").red(),
            result.document_identifier,
            style(format!("[{}]", result.method_used)).dim()
        ),
    }
    if let Some(path) = &result.ocr_text_artifact_path {
        println!("    {}", style(path.display()).dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer sentence", 10), "a longe...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }
}
