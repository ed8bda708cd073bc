//! On-disk layout of the mirror.

use crate::error::{Result, SyncError};
use std::path::{Path, PathBuf};

/// Schema document kept at the mirror root; never swept.
pub const SCHEMA_FILE: &str = "schema.json";

/// Rejects provider-supplied names that are not a single plain path component.
pub fn safe_component(name: &str) -> Result<&str> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(SyncError::UnsafePath(name.to_string()));
    }
    Ok(name)
}

/// `<root>/<table>`
pub fn table_dir(root: &Path, table: &str) -> Result<PathBuf> {
    Ok(root.join(safe_component(table)?))
}

/// `<sequence>_<filename>`, the name an artifact file is stored under.
pub fn artifact_file_name(sequence: u64, filename: &str) -> Result<String> {
    Ok(format!("{}_{}", sequence, safe_component(filename)?))
}

/// Removes a directory tree, treating a missing directory as already removed.
pub async fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
