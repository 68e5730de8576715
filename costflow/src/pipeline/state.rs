//! The run's single source of truth.
//!
//! A `PipelineState` is passed by value from stage to stage. Each stage
//! produces a new state with its own output field populated; nothing else
//! mutates it. `stage_history` is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::{
    CostEntry, Recommendation, ReportReceipt, Resource, RunPhase, StageName, StageOutput,
    StageResult,
};
use crate::errors::{CostflowError, PipelineStateError};

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Pipeline state for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Opaque run identifier, immutable.
    pub run_id: String,
    /// When the state was created.
    pub created_at: DateTime<Utc>,
    /// Snapshot format version.
    #[serde(default = "default_snapshot_version")]
    pub snapshot_version: u32,
    /// Discovered resources, set by Scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Vec<Resource>>,
    /// Resource id to cost entry, set by Analyze.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_data: Option<BTreeMap<String, CostEntry>>,
    /// Ranked recommendations, set by Optimize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Recommendation>>,
    /// Report sink receipt, set by Report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportReceipt>,
    #[serde(default)]
    stage_history: Vec<StageResult>,
}

impl PipelineState {
    /// Creates an empty state with a fresh time-ordered run id.
    #[must_use]
    pub fn start() -> Self {
        Self::with_run_id(Uuid::now_v7().to_string())
    }

    /// Creates an empty state with the given run id.
    #[must_use]
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            created_at: Utc::now(),
            snapshot_version: SNAPSHOT_VERSION,
            inventory: None,
            cost_data: None,
            recommendations: None,
            report: None,
            stage_history: Vec::new(),
        }
    }

    /// The append-only audit trail.
    #[must_use]
    pub fn stage_history(&self) -> &[StageResult] {
        &self.stage_history
    }

    /// Returns a new state with `result` appended to the history.
    #[must_use]
    pub fn with_result(mut self, result: StageResult) -> Self {
        self.stage_history.push(result);
        self
    }

    /// Returns a new state with the output's field populated.
    pub fn with_output(
        mut self,
        stage: StageName,
        output: StageOutput,
    ) -> Result<Self, PipelineStateError> {
        let produced = output.owner();
        if produced != stage {
            return Err(PipelineStateError::OutputMismatch { stage, produced });
        }
        match output {
            StageOutput::Inventory(v) => self.inventory = Some(v),
            StageOutput::CostData(m) => self.cost_data = Some(m),
            StageOutput::Recommendations(v) => self.recommendations = Some(v),
            StageOutput::Report(r) => self.report = Some(r),
        }
        Ok(self)
    }

    /// Returns true if `stage` has a success entry.
    #[must_use]
    pub fn has_succeeded(&self, stage: StageName) -> bool {
        self.stage_history
            .iter()
            .any(|r| r.stage == stage && r.is_success())
    }

    /// Number of recorded attempts of `stage`.
    #[must_use]
    pub fn attempts_of(&self, stage: StageName) -> usize {
        self.stage_history.iter().filter(|r| r.stage == stage).count()
    }

    /// The most recent entry, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<&StageResult> {
        self.stage_history.last()
    }

    /// Checks that `stage`'s predecessor has succeeded.
    pub fn check_ready(&self, stage: StageName) -> Result<(), PipelineStateError> {
        match stage.predecessor() {
            Some(requires) if !self.has_succeeded(requires) => {
                Err(PipelineStateError::OutOfOrder { stage, requires })
            }
            _ => Ok(()),
        }
    }

    /// The first stage lacking a success entry; `None` once all succeeded.
    #[must_use]
    pub fn next_stage(&self) -> Option<StageName> {
        StageName::ALL
            .into_iter()
            .find(|stage| !self.has_succeeded(*stage))
    }

    /// Returns true once every stage has succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next_stage().is_none()
    }

    /// Phase implied by the history alone.
    ///
    /// A state whose most recent entry is a failure of the next pending
    /// stage is `Failed`; resuming re-enters at that stage.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        let Some(next) = self.next_stage() else {
            return RunPhase::Done;
        };
        match self.last_result() {
            None => RunPhase::Pending,
            Some(last) if last.stage == next && last.is_failure() => RunPhase::Failed,
            Some(_) => RunPhase::for_stage(next),
        }
    }

    /// Serializes the state as a pretty JSON snapshot.
    pub fn to_snapshot(&self) -> Result<String, CostflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restores a state from a snapshot, checking its version.
    pub fn from_snapshot(json: &str) -> Result<Self, CostflowError> {
        let state: Self = serde_json::from_str(json)?;
        if state.snapshot_version != SNAPSHOT_VERSION {
            return Err(PipelineStateError::SnapshotVersion {
                found: state.snapshot_version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Money, ResourceKind};
    use pretty_assertions::assert_eq;

    fn resource(id: &str) -> Resource {
        Resource::new(id, id, ResourceKind::Disk, "westeurope", "P30", "rg")
    }

    fn success(stage: StageName) -> StageResult {
        StageResult::success(stage, Utc::now(), 1)
    }

    fn failure(stage: StageName) -> StageResult {
        StageResult::failure(stage, Utc::now(), 3, &CostflowError::transient("svc", "503"))
    }

    #[test]
    fn test_new_state_is_pending() {
        let state = PipelineState::start();

        assert!(!state.run_id.is_empty());
        assert_eq!(state.phase(), RunPhase::Pending);
        assert_eq!(state.next_stage(), Some(StageName::Scan));
        assert!(state.inventory.is_none());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(PipelineState::start().run_id, PipelineState::start().run_id);
    }

    #[test]
    fn test_with_output_rejects_foreign_field() {
        let err = PipelineState::start()
            .with_output(StageName::Scan, StageOutput::CostData(BTreeMap::new()))
            .unwrap_err();

        assert_eq!(
            err,
            PipelineStateError::OutputMismatch {
                stage: StageName::Scan,
                produced: StageName::Analyze
            }
        );
    }

    #[test]
    fn test_check_ready_enforces_predecessor() {
        let state = PipelineState::start();
        assert!(state.check_ready(StageName::Scan).is_ok());
        assert_eq!(
            state.check_ready(StageName::Analyze),
            Err(PipelineStateError::OutOfOrder {
                stage: StageName::Analyze,
                requires: StageName::Scan
            })
        );

        let state = state.with_result(failure(StageName::Scan));
        assert!(state.check_ready(StageName::Analyze).is_err());

        let state = state.with_result(success(StageName::Scan));
        assert!(state.check_ready(StageName::Analyze).is_ok());
    }

    #[test]
    fn test_phase_follows_history() {
        let state = PipelineState::start().with_result(success(StageName::Scan));
        assert_eq!(state.phase(), RunPhase::Analyzing);

        let state = state.with_result(failure(StageName::Analyze));
        assert_eq!(state.phase(), RunPhase::Failed);
        assert_eq!(state.next_stage(), Some(StageName::Analyze));

        let state = StageName::ALL[1..]
            .iter()
            .fold(state, |s, stage| s.with_result(success(*stage)));
        assert_eq!(state.phase(), RunPhase::Done);
        assert!(state.is_complete());
        assert_eq!(state.attempts_of(StageName::Analyze), 2);
        assert_eq!(state.stage_history().len(), 5);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_history_and_ids() {
        let mut costs = BTreeMap::new();
        costs.insert(
            "disk-1".to_string(),
            CostEntry::new("disk-1", Money::from_major(12, "USD")),
        );
        let state = PipelineState::with_run_id("run-42")
            .with_output(StageName::Scan, StageOutput::Inventory(vec![resource("disk-1")]))
            .unwrap()
            .with_result(success(StageName::Scan))
            .with_result(failure(StageName::Analyze))
            .with_output(StageName::Analyze, StageOutput::CostData(costs))
            .unwrap()
            .with_result(success(StageName::Analyze));

        let json = state.to_snapshot().unwrap();
        let restored = PipelineState::from_snapshot(&json).unwrap();

        assert_eq!(restored, state);
        assert_eq!(restored.run_id, "run-42");
        let order: Vec<_> = restored.stage_history().iter().map(|r| r.stage).collect();
        assert_eq!(order, vec![StageName::Scan, StageName::Analyze, StageName::Analyze]);
    }

    #[test]
    fn test_snapshot_version_mismatch() {
        let mut state = PipelineState::with_run_id("r");
        state.snapshot_version = 99;
        let json = serde_json::to_string(&state).unwrap();

        let err = PipelineState::from_snapshot(&json).unwrap_err();
        assert_eq!(err.kind(), "pipeline_state");
    }
}
