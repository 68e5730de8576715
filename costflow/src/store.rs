//! Persistence of pipeline state between stages.
//!
//! The persisted snapshot is the sole source of truth for a resume.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::CostflowError;
use crate::pipeline::PipelineState;

/// Saves and loads state snapshots by run id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists `state`, replacing any earlier snapshot of the same run.
    async fn save(&self, state: &PipelineState) -> Result<(), CostflowError>;

    /// Loads the latest snapshot of `run_id`, if any.
    async fn load(&self, run_id: &str) -> Result<Option<PipelineState>, CostflowError>;
}

/// Keeps snapshots in memory, serialized, so loads exercise the snapshot format.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, String>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, state: &PipelineState) -> Result<(), CostflowError> {
        let snapshot = state.to_snapshot()?;
        self.snapshots.write().insert(state.run_id.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<PipelineState>, CostflowError> {
        let snapshot = self.snapshots.read().get(run_id).cloned();
        snapshot.map(|s| PipelineState::from_snapshot(&s)).transpose()
    }
}

/// Writes `<dir>/<run_id>.json`, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path of a run.
    pub fn path_for(&self, run_id: &str) -> Result<PathBuf, CostflowError> {
        Ok(self.dir.join(format!("{}.json", checked_run_id(run_id)?)))
    }
}

/// Rejects run ids that cannot serve as a single path component.
pub(crate) fn checked_run_id(run_id: &str) -> Result<&str, CostflowError> {
    if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.starts_with('.') {
        return Err(CostflowError::Config(format!("invalid run id '{run_id}'")));
    }
    Ok(run_id)
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, state: &PipelineState) -> Result<(), CostflowError> {
        let path = self.path_for(&state.run_id)?;
        let tmp = path.with_extension("json.tmp");
        let snapshot = state.to_snapshot()?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&tmp, snapshot.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(run_id = %state.run_id, path = %path.display(), "Snapshot saved");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<PipelineState>, CostflowError> {
        let path = self.path_for(run_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(snapshot) => PipelineState::from_snapshot(&snapshot).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
