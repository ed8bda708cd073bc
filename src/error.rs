//! Error types for sync operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while listing, reconciling, or downloading dumps.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP transport error (connection, TLS, body stream).
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// The server answered with a non-success status code.
    #[error("invalid status code, got {status}: {body}")]
    Status { status: u16, body: String },

    /// The account has nothing published yet.
    #[error("no files exist for account, cannot sync")]
    NoFiles,

    /// The persisted sync cursor could not be parsed.
    #[error("state file is invalid: {0}")]
    InvalidState(#[source] serde_json::Error),

    /// A file kept failing after every retry attempt.
    #[error("max number of retries reached for {filename} (table {table}, {attempts} attempts): {source}")]
    DownloadExhausted {
        filename: String,
        table: String,
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// A provider-supplied name would escape the sync root.
    #[error("refusing to write outside the sync root: {0:?}")]
    UnsafePath(String),

    /// Some files of a full mirror failed to download.
    #[error("failed to download {failed} files, try running sync again")]
    IncompleteMirror { failed: usize },

    /// No schema document has been downloaded yet.
    #[error("could not find schema at {0:?}, have you downloaded files yet?")]
    SchemaMissing(PathBuf),

    /// Configuration problem.
    #[error("{0}")]
    Config(String),
}

impl SyncError {
    /// Whether the CLI should print only the message, without the cause chain.
    pub fn is_silent(&self) -> bool {
        matches!(self, SyncError::NoFiles)
    }

    /// Maps a 404 from a listing endpoint to [`SyncError::NoFiles`].
    pub fn not_found_as_no_files(self) -> Self {
        match self {
            SyncError::Status { status: 404, .. } => SyncError::NoFiles,
            other => other,
        }
    }
}

/// Surfaces a panicked or cancelled blocking task as an I/O error.
pub(crate) fn join_error(e: tokio::task::JoinError) -> SyncError {
    SyncError::IoError(io::Error::other(format!("Task join error: {}", e)))
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
