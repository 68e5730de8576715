//! Assertions over stage history.

use crate::core::{StageName, StageStatus};
use crate::pipeline::PipelineState;

/// `(stage, status)` pairs of the history, in order.
#[must_use]
pub fn history_of(state: &PipelineState) -> Vec<(StageName, StageStatus)> {
    state
        .stage_history()
        .iter()
        .map(|r| (r.stage, r.status))
        .collect()
}

/// Asserts exactly one success entry per stage, in execution order, and
/// no other entries.
pub fn assert_clean_run(state: &PipelineState) {
    let expected: Vec<_> = StageName::ALL
        .iter()
        .map(|stage| (*stage, StageStatus::Success))
        .collect();
    assert_eq!(
        history_of(state),
        expected,
        "Expected one success per stage in order"
    );
}

/// Asserts that `stage` was attempted `expected` times.
pub fn assert_attempts(state: &PipelineState, stage: StageName, expected: usize) {
    let actual = state.attempts_of(stage);
    assert_eq!(
        actual, expected,
        "Expected {expected} attempt(s) of '{stage}', got {actual}"
    );
}
