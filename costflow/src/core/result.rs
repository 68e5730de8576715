//! Audit record of one stage attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StageName, StageStatus};
use crate::errors::CostflowError;

/// Outcome metadata of one stage attempt, appended to `stage_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: StageName,
    /// Stage status.
    pub status: StageStatus,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt ended.
    pub ended_at: DateTime<Utc>,
    /// Executor attempts used (at least 1 once the stage was invoked).
    pub attempts: u32,
    /// Error message if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind of the last underlying cause if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl StageResult {
    /// Creates a success result ending now.
    #[must_use]
    pub fn success(stage: StageName, started_at: DateTime<Utc>, attempts: u32) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            started_at,
            ended_at: Utc::now(),
            attempts,
            error: None,
            error_kind: None,
        }
    }

    /// Creates a failure result ending now.
    #[must_use]
    pub fn failure(
        stage: StageName,
        started_at: DateTime<Utc>,
        attempts: u32,
        error: &CostflowError,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failure,
            started_at,
            ended_at: Utc::now(),
            attempts,
            error: Some(error.root_cause().to_string()),
            error_kind: Some(error.root_cause().kind().to_string()),
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, StageStatus::Success)
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StageStatus::Failure)
    }
}
