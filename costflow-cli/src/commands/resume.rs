use std::path::Path;

use anyhow::{Context, Result};

use super::Output;

/// Execute the `resume` command: continue a run from its last snapshot.
pub async fn execute(
    run_id: &str,
    estate: &Path,
    config_path: Option<&Path>,
    output: &Output<'_>,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let top_n = config.report.top_n;

    let orchestrator = super::orchestrator(estate, config, output)?;
    let outcome = orchestrator
        .resume(run_id)
        .await
        .with_context(|| format!("Failed to resume run '{run_id}'"))?;

    super::finish(outcome, top_n)
}
