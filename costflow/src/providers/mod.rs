//! File-backed port implementations.
//!
//! These back the CLI: an estate JSON file stands in for the cloud
//! inventory and billing APIs, a rule set generates candidates, and
//! reports land on disk as JSON, CSV or both.

mod estate;
mod rules;
mod sink;

pub use estate::{EstateFile, FileCostProvider, FileInventoryProvider};
pub use rules::{RuleBasedGenerator, RuleThresholds};
pub use sink::{CsvReportSink, FanOutReportSink, JsonReportSink, ReportFormat};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::CostflowConfig;
use crate::errors::CostflowError;
use crate::stages::StagePorts;

/// Ports over an estate file, writing reports into `report_dir` in `format`.
pub fn file_ports(
    estate_path: &Path,
    report_dir: impl Into<PathBuf>,
    format: ReportFormat,
    config: &CostflowConfig,
) -> Result<StagePorts, CostflowError> {
    let estate = Arc::new(EstateFile::load(estate_path)?);
    tracing::debug!(
        path = %estate_path.display(),
        resources = estate.resources.len(),
        costs = estate.costs.len(),
        "Estate loaded"
    );
    Ok(StagePorts::new(
        Arc::new(FileInventoryProvider::new(Arc::clone(&estate))),
        Arc::new(FileCostProvider::new(&estate)),
        Arc::new(RuleBasedGenerator::from_config(&config.optimize)),
        format.sink(report_dir),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionKind, RunPhase};
    use crate::pipeline::Orchestrator;
    use crate::testing::fixtures;
    use pretty_assertions::assert_eq;

    fn demo_estate() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/sample_estate.json")
    }

    #[tokio::test]
    async fn test_demo_estate_runs_end_to_end() {
        let out = tempfile::tempdir().unwrap();
        let config = fixtures::fast_config();
        let ports = file_ports(&demo_estate(), out.path(), ReportFormat::All, &config).unwrap();

        let outcome = Orchestrator::builder(ports)
            .with_config(config)
            .build()
            .unwrap()
            .run()
            .await;

        assert_eq!(outcome.phase, RunPhase::Done);
        let state = &outcome.state;
        assert_eq!(state.inventory.as_ref().map(Vec::len), Some(4));
        let recommendations = state.recommendations.as_ref().unwrap();
        assert_eq!(recommendations.len(), 6);
        assert_eq!(
            recommendations
                .iter()
                .filter(|r| r.action == ActionKind::Retag)
                .count(),
            2
        );
        let run_dir = out.path().join(&state.run_id);
        for name in ["report.json", "cost_data.csv", "recommendations.csv"] {
            assert!(run_dir.join(name).exists(), "{name} missing");
        }
        assert_eq!(state.report.as_ref().map(|r| r.locations.len()), Some(3));
    }

    #[test]
    fn test_missing_estate_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = file_ports(
            &dir.path().join("missing.json"),
            dir.path(),
            ReportFormat::Json,
            &CostflowConfig::default(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), "io");
    }
}
