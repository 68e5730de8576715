//! Executes one stage against a state.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use super::retry::{classify_error, Attempted, ErrorClass, RetryingExecutor};
use super::PipelineState;
use crate::core::StageResult;
use crate::errors::{CostflowError, PipelineStateError};
use crate::observability::SpanTimer;
use crate::stages::{Stage, StageContext};

/// Decides whether a failed stage attempt may be retried.
pub type Classifier = Arc<dyn Fn(&CostflowError) -> ErrorClass + Send + Sync>;

/// Outcome of one orchestrator-level stage attempt.
#[derive(Debug)]
pub struct StageRun {
    /// The new state, with exactly one history entry appended.
    pub state: PipelineState,
    /// The appended entry.
    pub result: StageResult,
    /// The final error when the stage failed.
    pub error: Option<CostflowError>,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

impl StageRun {
    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs stages through a `RetryingExecutor` and records their outcome.
///
/// Stage failures are data: they come back as a `StageRun` carrying the
/// error and a failure entry. Only a stage attempted before its predecessor
/// succeeded is reported as an `Err`, and then nothing is appended.
#[derive(Clone)]
pub struct StageRunner {
    executor: RetryingExecutor,
    classify: Classifier,
}

impl fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRunner")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl StageRunner {
    /// Creates a runner using the default error classifier.
    #[must_use]
    pub fn new(executor: RetryingExecutor) -> Self {
        Self {
            executor,
            classify: Arc::new(classify_error),
        }
    }

    /// Replaces the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    /// Runs `stage` against `state`.
    pub async fn run(
        &self,
        stage: &dyn Stage,
        state: &PipelineState,
        ctx: &StageContext,
    ) -> Result<StageRun, PipelineStateError> {
        let name = stage.name();
        state.check_ready(name)?;

        let started_at = Utc::now();
        let timer = SpanTimer::start(name.as_str());
        tracing::info!(run_id = %state.run_id, stage = %name, "Stage started");

        let classify = &self.classify;
        let outcome = self
            .executor
            .execute_classified(name.as_str(), || stage.execute(state, ctx), |e| classify(e))
            .await;

        let (next, error, attempts) = match outcome {
            Ok(Attempted { value, attempts }) => match state.clone().with_output(name, value) {
                Ok(next) => (next, None, attempts),
                Err(mismatch) => (state.clone(), Some(CostflowError::from(mismatch)), attempts),
            },
            Err(retry) => {
                let attempts = retry.attempts;
                (state.clone(), Some(CostflowError::from(retry)), attempts)
            }
        };

        let elapsed_ms = timer.finish();
        let result = match &error {
            None => {
                tracing::info!(
                    run_id = %state.run_id,
                    stage = %name,
                    attempts,
                    elapsed_ms,
                    "Stage completed"
                );
                StageResult::success(name, started_at, attempts)
            }
            Some(err) => {
                tracing::warn!(
                    run_id = %state.run_id,
                    stage = %name,
                    attempts,
                    elapsed_ms,
                    error = %err,
                    "Stage failed"
                );
                StageResult::failure(name, started_at, attempts, err)
            }
        };

        Ok(StageRun {
            state: next.with_result(result.clone()),
            result,
            error,
            elapsed_ms,
        })
    }
}
