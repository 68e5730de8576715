//! Run lifecycle events.
//!
//! The orchestrator reports progress as typed `PipelineEvent`s to an
//! `EventSink`. Sinks never fail the run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::Serialize;

use crate::core::{Money, StageName};

/// A lifecycle event of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum PipelineEvent {
    /// A fresh run began.
    #[serde(rename = "pipeline.started")]
    PipelineStarted {
        /// Run id.
        run_id: String,
    },
    /// A persisted run was picked up again.
    #[serde(rename = "pipeline.resumed")]
    PipelineResumed {
        /// Run id.
        run_id: String,
        /// First stage to execute.
        from: StageName,
    },
    /// A stage attempt began.
    #[serde(rename = "stage.started")]
    StageStarted {
        /// Run id.
        run_id: String,
        /// Stage name.
        stage: StageName,
    },
    /// A stage attempt succeeded.
    #[serde(rename = "stage.completed")]
    StageCompleted {
        /// Run id.
        run_id: String,
        /// Stage name.
        stage: StageName,
        /// Executor attempts used.
        attempts: u32,
        /// Wall-clock duration.
        duration_ms: u64,
    },
    /// A stage attempt failed for good.
    #[serde(rename = "stage.failed")]
    StageFailed {
        /// Run id.
        run_id: String,
        /// Stage name.
        stage: StageName,
        /// Executor attempts used.
        attempts: u32,
        /// Kind of the last cause.
        error_kind: String,
        /// Message of the last cause.
        error: String,
    },
    /// Every stage succeeded.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted {
        /// Run id.
        run_id: String,
        /// Wall-clock duration of this invocation.
        elapsed_ms: u64,
        /// Total monthly cost.
        total_cost: Money,
        /// Total potential savings.
        potential_savings: Money,
    },
    /// The run stopped early after the requested stage succeeded.
    #[serde(rename = "pipeline.paused")]
    PipelinePaused {
        /// Run id.
        run_id: String,
        /// The last stage executed.
        after: StageName,
        /// The stage a resume starts at.
        next: StageName,
    },
    /// The run halted on a failed stage.
    #[serde(rename = "pipeline.failed")]
    PipelineFailed {
        /// Run id.
        run_id: String,
        /// The failed stage.
        stage: StageName,
        /// Message of the last cause.
        error: String,
    },
}

impl PipelineEvent {
    /// Dotted event type, e.g. `stage.completed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline.started",
            Self::PipelineResumed { .. } => "pipeline.resumed",
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::PipelineCompleted { .. } => "pipeline.completed",
            Self::PipelinePaused { .. } => "pipeline.paused",
            Self::PipelineFailed { .. } => "pipeline.failed",
        }
    }

    /// The run this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        match self {
            Self::PipelineStarted { run_id }
            | Self::PipelineResumed { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::StageFailed { run_id, .. }
            | Self::PipelineCompleted { run_id, .. }
            | Self::PipelinePaused { run_id, .. }
            | Self::PipelineFailed { run_id, .. } => run_id,
        }
    }

    /// JSON form, including the `event` tag.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
