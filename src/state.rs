//! Persisted sync cursor.

use crate::error::{Result, SyncError};
use crate::types::SyncState;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes the `{ "sequence": n }` document between runs.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cursor. A missing file means nothing has been synced yet;
    /// a file that does not parse is an error.
    pub async fn load(&self) -> Result<SyncState> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {}, syncing full history", self.path.display());
                return Ok(SyncState::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(SyncError::InvalidState)
    }

    /// Writes the cursor to a sibling temp file and renames it into place.
    pub async fn save(&self, state: SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, serde_json::to_vec(&state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(sequence = state.sequence, "saved sync state");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
