use anyhow::{Context, Result};

/// Initialize structured logging.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the provided level.
pub fn init(log_level: &str, json: bool) -> Result<()> {
    costflow::observability::init_tracing(log_level, json)
        .with_context(|| format!("Failed to initialise logging at level '{log_level}'"))
}
