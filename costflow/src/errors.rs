//! Error types for the costflow pipeline.
//!
//! The taxonomy separates failures of external collaborators (transient or
//! fatal) from locally detected problems (validation, pipeline-state
//! invariants). Only transient external errors are ever retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::StageName;

/// The main error type for costflow operations.
#[derive(Debug, Error)]
pub enum CostflowError {
    /// A retryable failure of an external service (timeout, throttling, 5xx).
    #[error("Transient error from {service}: {message}")]
    TransientExternal {
        /// The external service that failed.
        service: String,
        /// The error message.
        message: String,
    },

    /// A non-retryable failure of an external service (auth, malformed request).
    #[error("Fatal error from {service}: {message}")]
    FatalExternal {
        /// The external service that failed.
        service: String,
        /// The error message.
        message: String,
    },

    /// Locally detected bad input.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A pipeline invariant was violated.
    #[error("{0}")]
    PipelineState(#[from] PipelineStateError),

    /// Retries stopped; carries the last underlying cause.
    #[error("{0}")]
    Retry(#[from] RetryError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration source.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CostflowError {
    /// Creates a transient external error.
    #[must_use]
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientExternal {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a fatal external error.
    #[must_use]
    pub fn fatal(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FatalExternal {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns a stable, snake_case name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientExternal { .. } => "transient",
            Self::FatalExternal { .. } => "fatal",
            Self::Validation(_) => "validation",
            Self::PipelineState(_) => "pipeline_state",
            Self::Retry(_) => "retry",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// Returns the underlying cause, looking through retry aggregation.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Retry(err) => err.cause.root_cause(),
            other => other,
        }
    }

    /// Returns true if the error is a transient external failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientExternal { .. })
    }
}

impl From<serde_json::Error> for CostflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when input fails a local check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "Validation failed{}: {message}",
    .field.as_ref().map(|f| format!(" for '{f}'")).unwrap_or_default()
)]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The offending field, if known.
    pub field: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Error raised when a stage is attempted against an inconsistent state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineStateError {
    /// A stage was attempted before its predecessor succeeded.
    #[error("Stage '{stage}' cannot run: predecessor '{requires}' has not succeeded")]
    OutOfOrder {
        /// The stage that was attempted.
        stage: StageName,
        /// The predecessor lacking a success entry.
        requires: StageName,
    },

    /// A stage produced output belonging to another stage.
    #[error("Stage '{stage}' produced output for '{produced}'")]
    OutputMismatch {
        /// The stage that ran.
        stage: StageName,
        /// The stage whose output field was produced.
        produced: StageName,
    },

    /// A stage read a field its predecessor should have written.
    #[error("Stage '{stage}' requires '{field}', which is absent")]
    MissingInput {
        /// The stage that ran.
        stage: StageName,
        /// The absent field.
        field: &'static str,
    },

    /// The snapshot format is not understood.
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion {
        /// Version found in the snapshot.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

/// Why a retrying executor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStop {
    /// Every attempt failed with a retryable error.
    Exhausted,
    /// A non-retryable error aborted the remaining attempts.
    Fatal,
}

/// Aggregated error returned once retrying stops.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {cause}")]
pub struct RetryError {
    /// The operation name.
    pub operation: String,
    /// Total attempts made.
    pub attempts: u32,
    /// Why retrying stopped.
    pub stop: RetryStop,
    /// The last underlying cause.
    #[source]
    pub cause: Box<CostflowError>,
}

impl RetryError {
    /// Creates a new retry error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        attempts: u32,
        stop: RetryStop,
        cause: CostflowError,
    ) -> Self {
        Self {
            operation: operation.into(),
            attempts,
            stop,
            cause: Box::new(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_and_fatal_constructors() {
        let transient = CostflowError::transient("inventory", "throttled");
        let fatal = CostflowError::fatal("billing", "unauthorized");

        assert!(transient.is_transient());
        assert!(!fatal.is_transient());
        assert_eq!(transient.kind(), "transient");
        assert_eq!(fatal.kind(), "fatal");
        assert!(fatal.to_string().contains("billing"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("must be at least 1").with_field("retry.max_attempts");
        assert_eq!(
            err.to_string(),
            "Validation failed for 'retry.max_attempts': must be at least 1"
        );

        let plain = ValidationError::new("no resources");
        assert_eq!(plain.to_string(), "Validation failed: no resources");
    }

    #[test]
    fn test_pipeline_state_error_display() {
        let err = PipelineStateError::OutOfOrder {
            stage: StageName::Optimize,
            requires: StageName::Analyze,
        };
        assert!(err.to_string().contains("'optimize'"));
        assert!(err.to_string().contains("'analyze'"));
    }

    #[test]
    fn test_root_cause_unwraps_retry() {
        let err = CostflowError::from(RetryError::new(
            "scan",
            3,
            RetryStop::Exhausted,
            CostflowError::transient("inventory", "503"),
        ));

        assert_eq!(err.kind(), "retry");
        assert_eq!(err.root_cause().kind(), "transient");
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }
}
