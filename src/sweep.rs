//! Removing files that left the authoritative set.

use crate::error::{join_error, Result, SyncError};
use crate::layout::SCHEMA_FILE;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Deletes every file under `root` whose `<table>/<filename>` path is not in
/// `keep`. `<root>/schema.json` is never removed. Returns the deleted paths.
pub async fn sweep_stale_files<I, T, F>(root: &Path, keep: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = (T, F)>,
    T: AsRef<Path>,
    F: AsRef<Path>,
{
    let keep: HashSet<PathBuf> = keep
        .into_iter()
        .map(|(table, filename)| table.as_ref().join(filename))
        .collect();
    let root = root.to_path_buf();

    let removed = tokio::task::spawn_blocking(move || sweep_blocking(&root, &keep))
        .await
        .map_err(join_error)??;

    info!("removed {} stale files", removed.len());
    Ok(removed)
}

fn sweep_blocking(root: &Path, keep: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&root.to_string_lossy()).trim_end_matches('/')
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| SyncError::Config(format!("bad sweep pattern {}: {}", pattern, e)))?;

    let mut removed = Vec::new();
    for entry in entries {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if relative == Path::new(SCHEMA_FILE) || keep.contains(relative) {
            continue;
        }
        debug!("removing stale file {}", path.display());
        std::fs::remove_file(&path)?;
        removed.push(path);
    }
    Ok(removed)
}
