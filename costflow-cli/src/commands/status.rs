use std::path::Path;

use anyhow::{Context, Result};

use costflow::store::{FileSnapshotStore, SnapshotStore};

/// Execute the `status` command: print a run's phase and stage history.
pub async fn execute(run_id: &str, state_dir: &Path) -> Result<()> {
    let store = FileSnapshotStore::new(state_dir);
    let state = store
        .load(run_id)
        .await
        .with_context(|| format!("Failed to read snapshot for run '{run_id}'"))?
        .with_context(|| format!("No snapshot for run '{run_id}' in {}", state_dir.display()))?;

    println!("Run {}", state.run_id);
    println!("  Created: {}", state.created_at.to_rfc3339());
    println!("  Phase:   {}", state.phase());
    for result in state.stage_history() {
        let detail = result.error.as_deref().unwrap_or("");
        println!(
            "  {:<9} {:<8} attempts={} {}ms {}",
            result.stage.as_str(),
            result.status.to_string(),
            result.attempts,
            result.duration_ms(),
            detail
        );
    }
    Ok(())
}
