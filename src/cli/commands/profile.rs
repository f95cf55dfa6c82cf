//! Dump the active jurisdiction profile, as a starting point for a custom one.

use std::path::Path;

use anyhow::Context;
use console::style;

use lienscan::Config;

pub async fn cmd_profile(config: &Config, output: Option<&Path>) -> anyhow::Result<()> {
    let profile = config.load_profile()?;
    // Fail before writing anything if the patterns don't compile.
    profile.compile()?;
    let toml = profile.to_toml_string()?;

    match output {
        Some(path) => {
            tokio::fs::write(path, toml)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Wrote profile {} to {}",
                style("✓").green(),
                profile.name,
                path.display()
            );
        }
        None => print!("{}", toml),
    }
    Ok(())
}
