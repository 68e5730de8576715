//! Pipeline state and execution.
//!
//! This module provides:
//! - The accumulated pipeline state and its snapshots
//! - A TTL result cache with single-flight computation
//! - Retry with classified errors and exponential backoff
//! - Stage running, ranking and orchestration

mod cache;
mod orchestrator;
mod ranker;
mod retry;
mod runner;
mod state;

#[cfg(test)]
mod integration_tests;

pub use cache::{CacheConfig, CacheKey, CacheStats, ResultCache};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, RunMetrics, RunOutcome, StageFailure,
};
pub use ranker::{impact_weight, risk_penalty, RecommendationRanker};
pub use retry::{
    classify_error, Attempted, ErrorClass, JitterStrategy, RetryConfig, RetryingExecutor,
};
pub use runner::{Classifier, StageRun, StageRunner};
pub use state::{PipelineState, SNAPSHOT_VERSION};
