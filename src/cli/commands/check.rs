//! Environment check: OCR backend, profile, diagnostics and LLM.

use console::style;

use lienscan::llm::LlmClient;
use lienscan::{Config, OcrBackend, TesseractBackend};

pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("lienscan Status").bold());
    println!("{}", "-".repeat(50));

    match &config.source_path {
        Some(path) => println!("  {:<15} {}", "Config", path.display()),
        None => println!("  {:<15} {}", "Config", style("defaults").dim()),
    }

    println!("\n{}", style("OCR Backend:").cyan());
    let tesseract = TesseractBackend::with_config(config.ocr.tesseract.clone());
    if tesseract.is_available() {
        println!("  {:<15} {}", "Tesseract", style("✓ available").green());
    } else {
        println!("  {:<15} {}", "Tesseract", style("✗ not available").red());
        println!(
            "                  {}",
            style(tesseract.availability_hint()).dim()
        );
    }

    println!("\n{}", style("Profile:").cyan());
    match config.load_profile().and_then(|p| Ok(p.compile()?)) {
        Ok(compiled) => println!(
            "  {:<15} {} ({} boundary, {} street patterns)",
            compiled.profile().name,
            style("✓ compiled").green(),
            compiled.boundary.len(),
            compiled.street.len()
        ),
        Err(e) => println!("  {:<15} {}", "profile", style(format!("✗ {}", e)).red()),
    }

    println!("\n{}", style("Diagnostics:").cyan());
    match config.debug_dir() {
        Some(dir) => println!("  {:<15} {}", "Directory", dir.display()),
        None => println!("  {:<15} {}", "Directory", style("disabled").dim()),
    }

    println!("\n{}", style("LLM Fallback:").cyan());
    if !config.llm.enabled {
        println!(
            "  {:<15} {}",
            "Status",
            style("disabled (set LLM_ENABLED=true or [llm] enabled)").dim()
        );
    } else {
        let label = format!("{} {}", config.llm.provider.as_str(), config.llm.model);
        let client = LlmClient::new(config.llm.clone())?;
        let status = if !config.llm.has_credentials() {
            style("✗ missing API key".to_string()).red()
        } else if client.is_available().await {
            style(format!("✓ reachable at {}", config.llm.endpoint)).green()
        } else {
            style(format!("✗ unreachable at {}", config.llm.endpoint)).red()
        };
        println!("  {:<15} {}", label, status);
    }

    println!();
    Ok(())
}
