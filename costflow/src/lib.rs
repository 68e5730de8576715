//! # Costflow
//!
//! A stateful cloud-cost review pipeline.
//!
//! A run discovers resources (Scan), attributes monthly cost to them
//! (Analyze), proposes and ranks savings (Optimize) and hands the result to
//! a report sink (Report). Costflow provides:
//!
//! - **Accumulating state**: each stage fills one field and appends to the
//!   stage history; snapshots make a run resumable
//! - **Retry with backoff**: transient external failures are retried,
//!   fatal ones stop the stage at once
//! - **Result caching**: external calls are memoized with a TTL so a retried
//!   stage never repeats a sub-call that already succeeded
//! - **Deterministic ranking**: recommendations are ordered by a fixed score
//!   with total tie-breaking
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use costflow::prelude::*;
//!
//! let ports = file_ports(estate_path, "reports", ReportFormat::All, &config)?;
//! let orchestrator = Orchestrator::builder(ports)
//!     .with_config(config)
//!     .with_snapshot_store(Arc::new(FileSnapshotStore::new(".costflow/runs")))
//!     .build()?;
//!
//! let outcome = orchestrator.run().await;
//! println!("{}", outcome.metrics.summary.total_potential_savings);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod stages;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::CostflowConfig;
    pub use crate::core::{
        ActionKind, Candidate, CostEntry, CostSummary, Effort, InventoryFilter, Level, Money,
        Recommendation, Resource, ResourceKind, Risk, RunPhase, StageName, StageOutput,
        StageResult, StageStatus,
    };
    pub use crate::errors::{CostflowError, PipelineStateError, RetryError, ValidationError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::pipeline::{
        Orchestrator, OrchestratorBuilder, PipelineState, RecommendationRanker, ResultCache,
        RetryConfig, RetryingExecutor, RunOutcome, StageRunner,
    };
    pub use crate::stages::{Stage, StageContext, StagePorts};
    pub use crate::store::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};
}

pub use errors::CostflowError;
