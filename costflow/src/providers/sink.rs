//! Report sinks writing JSON and CSV files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::core::{ActionKind, Level, ReportReceipt};
use crate::errors::{CostflowError, ValidationError};
use crate::stages::{ReportPayload, ReportSink};
use crate::store::checked_run_id;

/// Which files a run's report is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// `report.json` only.
    Json,
    /// `cost_data.csv` and `recommendations.csv`.
    Csv,
    /// Every format.
    #[default]
    All,
}

impl ReportFormat {
    /// Builds the sink for this format rooted at `dir`.
    #[must_use]
    pub fn sink(self, dir: impl Into<PathBuf>) -> Arc<dyn ReportSink> {
        let dir = dir.into();
        match self {
            Self::Json => Arc::new(JsonReportSink::new(dir)),
            Self::Csv => Arc::new(CsvReportSink::new(dir)),
            Self::All => {
                let sinks: Vec<Arc<dyn ReportSink>> = vec![
                    Arc::new(JsonReportSink::new(dir.clone())),
                    Arc::new(CsvReportSink::new(dir)),
                ];
                Arc::new(FanOutReportSink::new(sinks))
            }
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::All => "all",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ReportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "all" => Ok(Self::All),
            other => Err(ValidationError::new(format!(
                "unknown report format '{other}', expected json, csv or all"
            ))
            .with_field("format")),
        }
    }
}

fn run_dir(root: &Path, run_id: &str) -> Result<PathBuf, CostflowError> {
    Ok(root.join(checked_run_id(run_id)?))
}

async fn write_file(path: &Path, body: Vec<u8>) -> Result<(), CostflowError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Writes each report to `<dir>/<run_id>/report.json`.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    dir: PathBuf,
    pretty: bool,
}

impl JsonReportSink {
    /// Creates a sink rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pretty: true,
        }
    }

    /// Writes compact JSON instead of pretty-printed.
    #[must_use]
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    /// The root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the report of `run_id` is written.
    pub fn report_path(&self, run_id: &str) -> Result<PathBuf, CostflowError> {
        Ok(run_dir(&self.dir, run_id)?.join("report.json"))
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn emit(&self, payload: &ReportPayload) -> Result<ReportReceipt, CostflowError> {
        let path = self.report_path(&payload.run_id)?;
        let body = if self.pretty {
            serde_json::to_vec_pretty(payload)?
        } else {
            serde_json::to_vec(payload)?
        };
        write_file(&path, body).await?;

        tracing::info!(run_id = %payload.run_id, path = %path.display(), "Report written");
        Ok(ReportReceipt::new(vec![path.display().to_string()]))
    }
}

const COST_HEADER: [&str; 3] = ["resource_id", "monthly_cost_minor", "currency"];

const RECOMMENDATION_HEADER: [&str; 9] = [
    "rank",
    "resource_id",
    "action",
    "estimated_savings_minor",
    "currency",
    "effort",
    "risk",
    "priority_score",
    "rationale",
];

#[derive(Serialize)]
struct CostRow<'a> {
    resource_id: &'a str,
    monthly_cost_minor: i64,
    currency: &'a str,
}

#[derive(Serialize)]
struct RecommendationRow<'a> {
    rank: usize,
    resource_id: &'a str,
    action: ActionKind,
    estimated_savings_minor: i64,
    currency: &'a str,
    effort: Level,
    risk: Level,
    priority_score: f64,
    rationale: &'a str,
}

/// Writes `cost_data.csv` and `recommendations.csv` under `<dir>/<run_id>/`.
///
/// Amounts are integer minor units with a separate currency column.
/// Recommendations keep rank order, starting at 1.
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    dir: PathBuf,
}

impl CsvReportSink {
    /// Creates a sink rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn cost_csv(payload: &ReportPayload) -> Result<Vec<u8>, CostflowError> {
        encode_csv(
            &COST_HEADER,
            payload.cost_data.values().map(|entry| CostRow {
                resource_id: &entry.resource_id,
                monthly_cost_minor: entry.monthly_cost.minor_units,
                currency: &entry.monthly_cost.currency,
            }),
        )
    }

    fn recommendations_csv(payload: &ReportPayload) -> Result<Vec<u8>, CostflowError> {
        encode_csv(
            &RECOMMENDATION_HEADER,
            payload
                .recommendations
                .iter()
                .enumerate()
                .map(|(i, rec)| RecommendationRow {
                    rank: i + 1,
                    resource_id: &rec.resource_id,
                    action: rec.action,
                    estimated_savings_minor: rec.estimated_savings.minor_units,
                    currency: &rec.estimated_savings.currency,
                    effort: rec.effort,
                    risk: rec.risk,
                    priority_score: rec.priority_score,
                    rationale: &rec.rationale,
                }),
        )
    }
}

fn encode_csv<R: Serialize>(
    header: &[&str],
    rows: impl IntoIterator<Item = R>,
) -> Result<Vec<u8>, CostflowError> {
    let csv_error = |e: csv::Error| CostflowError::Serialization(e.to_string());
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| CostflowError::Serialization(e.to_string()))
}

#[async_trait]
impl ReportSink for CsvReportSink {
    async fn emit(&self, payload: &ReportPayload) -> Result<ReportReceipt, CostflowError> {
        let dir = run_dir(&self.dir, &payload.run_id)?;
        let costs = dir.join("cost_data.csv");
        let recommendations = dir.join("recommendations.csv");

        write_file(&costs, Self::cost_csv(payload)?).await?;
        write_file(&recommendations, Self::recommendations_csv(payload)?).await?;

        tracing::info!(
            run_id = %payload.run_id,
            dir = %dir.display(),
            rows = payload.recommendations.len(),
            "CSV report written"
        );
        Ok(ReportReceipt::new(vec![
            costs.display().to_string(),
            recommendations.display().to_string(),
        ]))
    }
}

/// Emits to several sinks in order; the receipt lists every location.
///
/// Stops at the first failing sink.
pub struct FanOutReportSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanOutReportSink {
    /// Creates a sink over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

impl fmt::Debug for FanOutReportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutReportSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl ReportSink for FanOutReportSink {
    async fn emit(&self, payload: &ReportPayload) -> Result<ReportReceipt, CostflowError> {
        let mut locations = Vec::new();
        for sink in &self.sinks {
            locations.extend(sink.emit(payload).await?.locations);
        }
        Ok(ReportReceipt::new(locations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostflowConfig;
    use crate::core::{StageName, StageOutput, StageResult};
    use crate::pipeline::{PipelineState, RecommendationRanker};
    use crate::stages::MockReportSink;
    use crate::testing::fixtures;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn payload() -> ReportPayload {
        let (resources, costs, candidates) = fixtures::three_resource_estate();
        let mut candidates = candidates;
        candidates[0].rationale = "cut \"vm-a\", then recheck".to_string();
        let ranked = RecommendationRanker::new().rank(&candidates);
        let state = PipelineState::with_run_id("run-42")
            .with_output(StageName::Scan, StageOutput::Inventory(resources))
            .unwrap()
            .with_result(StageResult::success(StageName::Scan, Utc::now(), 1))
            .with_output(StageName::Analyze, StageOutput::CostData(costs))
            .unwrap()
            .with_result(StageResult::success(StageName::Analyze, Utc::now(), 1))
            .with_output(StageName::Optimize, StageOutput::Recommendations(ranked))
            .unwrap()
            .with_result(StageResult::success(StageName::Optimize, Utc::now(), 1));
        ReportPayload::build(&state, &CostflowConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_writes_report_under_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path());

        let receipt = sink.emit(&payload()).await.unwrap();

        let path = dir.path().join("run-42").join("report.json");
        assert_eq!(receipt.locations, vec![path.display().to_string()]);
        let written: ReportPayload =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.run_id, "run-42");
        assert_eq!(written.inventory.len(), 3);
        assert_eq!(written.stage_history.len(), 3);
    }

    #[test]
    fn test_rejects_path_like_run_ids() {
        let sink = JsonReportSink::new("/tmp/reports");

        tokio_test::assert_err!(sink.report_path("../escape"));
        tokio_test::assert_err!(sink.report_path("a/b"));
        tokio_test::assert_ok!(sink.report_path("run-1"));
    }

    #[tokio::test]
    async fn test_csv_sink_writes_costs_and_ranked_recommendations() {
        let dir = tempfile::tempdir().unwrap();
        let payload = payload();

        let receipt = CsvReportSink::new(dir.path()).emit(&payload).await.unwrap();

        let run_dir = dir.path().join("run-42");
        assert_eq!(
            receipt.locations,
            vec![
                run_dir.join("cost_data.csv").display().to_string(),
                run_dir.join("recommendations.csv").display().to_string(),
            ]
        );

        let costs = std::fs::read_to_string(run_dir.join("cost_data.csv")).unwrap();
        let lines: Vec<&str> = costs.lines().collect();
        assert_eq!(lines[0], "resource_id,monthly_cost_minor,currency");
        assert_eq!(lines.len(), payload.cost_data.len() + 1);

        let recs = std::fs::read_to_string(run_dir.join("recommendations.csv")).unwrap();
        let lines: Vec<&str> = recs.lines().collect();
        assert_eq!(lines.len(), payload.recommendations.len() + 1);
        assert!(lines[0].starts_with("rank,resource_id,action,"));
        let first = &payload.recommendations[0];
        assert!(lines[1].starts_with(&format!(
            "1,{},{},{},USD,",
            first.resource_id, first.action, first.estimated_savings.minor_units
        )));
        assert!(recs.contains("\"cut \"\"vm-a\"\", then recheck\""));
    }

    #[tokio::test]
    async fn test_csv_sink_writes_headers_for_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut payload = payload();
        payload.cost_data.clear();
        payload.recommendations.clear();

        CsvReportSink::new(dir.path()).emit(&payload).await.unwrap();

        let recs =
            std::fs::read_to_string(dir.path().join("run-42").join("recommendations.csv")).unwrap();
        assert_eq!(recs.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_all_format_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();

        let receipt = ReportFormat::All.sink(dir.path()).emit(&payload()).await.unwrap();

        assert_eq!(receipt.locations.len(), 3);
        for name in ["report.json", "cost_data.csv", "recommendations.csv"] {
            assert!(dir.path().join("run-42").join(name).exists(), "{name} missing");
        }
    }

    #[tokio::test]
    async fn test_fan_out_stops_at_first_failure() {
        let mut failing = MockReportSink::new();
        failing
            .expect_emit()
            .returning(|_| Err(CostflowError::fatal("sink", "disk full")));
        let mut never = MockReportSink::new();
        never.expect_emit().times(0);
        let sinks: Vec<Arc<dyn ReportSink>> = vec![Arc::new(failing), Arc::new(never)];
        let sink = FanOutReportSink::new(sinks);

        let err = sink.emit(&payload()).await.unwrap_err();

        assert_eq!(err.kind(), "fatal");
    }

    #[test]
    fn test_report_format_parsing() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("CSV".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert_eq!(ReportFormat::default(), ReportFormat::All);
        assert_eq!(ReportFormat::All.to_string(), "all");

        let err = "html".parse::<ReportFormat>().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("format"));
    }
}
