use std::path::Path;

use anyhow::{Context, Result};

/// Execute the `config` command: print the effective configuration.
pub fn execute(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let rendered = serde_json::to_string_pretty(&config).context("Failed to render config")?;
    println!("{rendered}");
    Ok(())
}
