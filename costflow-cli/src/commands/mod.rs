pub mod config;
pub mod resume;
pub mod run;
pub mod status;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use costflow::config::CostflowConfig;
use costflow::core::StageName;
use costflow::events::LoggingEventSink;
use costflow::pipeline::{Orchestrator, RunOutcome};
use costflow::providers::ReportFormat;
use costflow::store::FileSnapshotStore;

/// Output options shared by `run` and `resume`.
#[derive(Debug, Clone, Copy)]
pub struct Output<'a> {
    /// Snapshot directory.
    pub state_dir: &'a Path,
    /// Report root; each run writes under `<run-id>/`.
    pub output_dir: &'a Path,
    pub format: ReportFormat,
    /// Stage after which the run pauses.
    pub until: Option<StageName>,
}

/// Loads configuration from defaults, the optional file and the environment.
pub fn load_config(path: Option<&Path>) -> Result<CostflowConfig> {
    CostflowConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load config: {}", p.display()),
        None => "Failed to load config from environment".to_string(),
    })
}

/// Wires file-backed ports, the snapshot store and log events.
pub fn orchestrator(
    estate: &Path,
    config: CostflowConfig,
    output: &Output<'_>,
) -> Result<Orchestrator> {
    let ports = costflow::providers::file_ports(estate, output.output_dir, output.format, &config)
        .with_context(|| format!("Failed to load estate: {}", estate.display()))?;
    let mut builder = Orchestrator::builder(ports)
        .with_config(config)
        .with_snapshot_store(Arc::new(FileSnapshotStore::new(output.state_dir)))
        .with_event_sink(Arc::new(LoggingEventSink::default()));
    if let Some(stage) = output.until {
        builder = builder.with_stop_after(stage);
    }
    Ok(builder.build()?)
}

/// Human-readable summary of a finished run.
pub fn render_outcome(outcome: &RunOutcome, top_n: usize) -> String {
    let state = &outcome.state;
    let summary = &outcome.metrics.summary;
    let mut out = String::new();

    let _ = writeln!(out, "Run {} finished: {}", state.run_id, outcome.phase);
    let _ = writeln!(
        out,
        "  Resources:         {}",
        state.inventory.as_ref().map_or(0, Vec::len)
    );
    let _ = writeln!(out, "  Monthly cost:      {}", summary.total_cost);
    let _ = writeln!(
        out,
        "  Potential savings: {} ({:.1}%)",
        summary.total_potential_savings, summary.savings_percentage
    );
    let _ = writeln!(out, "  Recommendations:   {}", summary.recommendation_count);
    let _ = writeln!(out, "  Duration:          {} ms", outcome.metrics.elapsed_ms);

    if let Some(recommendations) = &state.recommendations {
        if !recommendations.is_empty() {
            let _ = writeln!(out, "Top recommendations:");
        }
        for (i, rec) in recommendations.iter().take(top_n).enumerate() {
            let _ = writeln!(
                out,
                "  {}. [{}] {}: {} /month (effort {}, risk {})",
                i + 1,
                rec.action,
                rec.resource_id,
                rec.estimated_savings,
                rec.effort,
                rec.risk
            );
        }
    }
    if let Some(report) = &state.report {
        for location in &report.locations {
            let _ = writeln!(out, "Report: {location}");
        }
    }
    if let Some(after) = outcome.paused_after {
        let _ = writeln!(out, "Paused after {after}");
        let _ = writeln!(out, "Continue with: costflow resume {} --estate <file>", state.run_id);
    }
    if let Some(failure) = &outcome.failure {
        let _ = writeln!(
            out,
            "Failed at {} after {} attempt(s): {}",
            failure.stage, failure.attempts, failure.error
        );
        let _ = writeln!(out, "Resume with: costflow resume {} --estate <file>", state.run_id);
    }
    for err in &outcome.persist_errors {
        let _ = writeln!(out, "Warning: snapshot not saved: {err}");
    }
    out
}

/// Prints the outcome and turns a failed run into an error.
pub fn finish(outcome: RunOutcome, top_n: usize) -> Result<()> {
    print!("{}", render_outcome(&outcome, top_n));
    if let Some(failure) = outcome.failure {
        anyhow::bail!(
            "Run {} failed at stage '{}'",
            outcome.state.run_id,
            failure.stage
        );
    }
    Ok(())
}
