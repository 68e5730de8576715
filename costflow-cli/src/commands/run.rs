use std::path::Path;

use anyhow::Result;

use super::Output;

/// Execute the `run` command: load config and estate, run the stages up to
/// `--until` or to the end.
pub async fn execute(
    estate: &Path,
    config_path: Option<&Path>,
    limit: Option<usize>,
    output: &Output<'_>,
) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if limit.is_some() {
        config.scan.limit = limit;
    }
    let top_n = config.report.top_n;

    let orchestrator = super::orchestrator(estate, config, output)?;
    let outcome = orchestrator.run().await;

    tracing::info!(
        run_id = %outcome.state.run_id,
        phase = %outcome.phase,
        elapsed_ms = outcome.metrics.elapsed_ms,
        "Run finished"
    );
    super::finish(outcome, top_n)
}
