//! `tracing-subscriber` installation and span timing.

use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::errors::CostflowError;

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` wins over `level` when set. With `json`, each event is written
/// as one JSON object per line.
pub fn init_tracing(level: &str, json: bool) -> Result<(), CostflowError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CostflowError::Config(format!("invalid log level '{level}': {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CostflowError::Config(format!("tracing already initialised: {e}")))
}

/// Measures wall-clock time of a named span.
#[derive(Debug, Clone)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logs it at debug level and returns the duration.
    #[must_use]
    pub fn finish(self) -> u64 {
        let elapsed_ms = self.elapsed_ms();
        ::tracing::debug!(span = %self.name, elapsed_ms, "Span finished");
        elapsed_ms
    }
}
