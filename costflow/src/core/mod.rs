//! Core domain model types for costflow.
//!
//! This module contains the fundamental types threaded through the pipeline:
//! - Stage names, statuses and run phases
//! - Resources, cost entries and money
//! - Candidates and ranked recommendations
//! - Stage outputs and stage results
//! - Cost and savings summaries

mod money;
mod output;
mod recommendation;
mod resource;
mod result;
mod status;
mod summary;

pub use money::Money;
pub use output::{ReportReceipt, StageOutput};
pub use recommendation::{ActionKind, Candidate, Effort, Level, Recommendation, Risk};
pub use resource::{CostEntry, InventoryFilter, Resource, ResourceKind, TimeWindow};
pub use result::StageResult;
pub use status::{RunPhase, StageName, StageStatus};
pub use summary::CostSummary;
