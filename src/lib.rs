//! dumpsync - Incremental mirror of data-warehouse export dumps
//!
//! A provider periodically publishes dumps, each holding per-table artifacts
//! that are either full snapshots or partial increments over an earlier
//! snapshot. This library works out which artifacts bring a local mirror up
//! to date and downloads them with bounded concurrency and retries.
//!
//! # Features
//!
//! - **Incremental Sync**: Only dumps newer than the persisted cursor are fetched
//! - **Snapshot Reconciliation**: Partial chains are walked back to their base snapshot
//! - **Automatic Retry**: Exponential backoff for every file download
//! - **Full Mirror**: Manifest-driven mirror with stale file cleanup
//! - **Unpack**: Merge a table's gzip files into one tab-separated file
//!
//! # Example
//!
//! ```no_run
//! use dumpsync::{RawConfig, StateStore, Syncer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RawConfig::from_toml(&std::fs::read_to_string("config.toml")?)?
//!     .resolve(&std::env::current_dir()?, |name| std::env::var(name).ok())?;
//!
//! let syncer = Syncer::from_config(&config)?;
//! let report = syncer.sync(&StateStore::new(&config.state_file)).await?;
//! println!("synced up to sequence {}", report.sequence);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod listing;
pub mod mirror;
pub mod orchestrator;
pub mod progress;
pub mod reconcile;
pub mod requests;
pub mod state;
pub mod sweep;
pub mod sync;
pub mod types;
pub mod unpack;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ExportApi};
pub use config::{RawConfig, RetryConfig, SyncConfig};
pub use download::{ByteStream, DownloadContext, FileDownloader, FileSource, HttpFileSource};
pub use error::{Result, SyncError};
pub use mirror::MirrorReport;
pub use orchestrator::{Orchestrator, SyncSummary, TableSummary};
pub use reconcile::{reconcile, ArtifactGroups, ChainState, Reconciliation};
pub use state::StateStore;
pub use sync::{SyncReport, Syncer};
pub use types::{Artifact, ArtifactInfo, DownloadLink, Dump, DumpFiles, SyncState};
