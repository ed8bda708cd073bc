//! Incremental sync: the cursor-driven run mode.

use crate::api::{ApiClient, ExportApi};
use crate::config::SyncConfig;
use crate::download::{FileDownloader, FileSource, HttpFileSource};
use crate::error::Result;
use crate::layout::SCHEMA_FILE;
use crate::listing::{list_dumps_after, PAGE_SIZE};
use crate::orchestrator::{Orchestrator, SyncSummary};
use crate::progress::file_progress;
use crate::reconcile::reconcile;
use crate::state::StateStore;
use crate::types::SyncState;
use std::path::{Path, PathBuf};
use tracing::info;

/// Collaborators shared by every run mode.
pub struct Syncer<A, S> {
    pub(crate) api: A,
    pub(crate) downloader: FileDownloader<S>,
    pub(crate) root: PathBuf,
    pub(crate) max_connections: usize,
    pub(crate) show_progress: bool,
}

/// Outcome of an incremental run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Cursor before the run.
    pub previous: u64,
    /// Cursor after the run; equal to `previous` when nothing was new.
    pub sequence: u64,
    pub dumps: usize,
    pub tables: SyncSummary,
}

impl Syncer<ApiClient, HttpFileSource> {
    /// Wires the signed API client and plain HTTP downloads from `config`.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let api = ApiClient::new(&config.api)?;
        let source = HttpFileSource::new(api.http().clone());
        Ok(Self::new(
            api,
            FileDownloader::new(source, config.retry.clone()),
            &config.save_location,
            config.max_connections,
        ))
    }
}

impl<A: ExportApi, S: FileSource> Syncer<A, S> {
    pub fn new(
        api: A,
        downloader: FileDownloader<S>,
        root: impl Into<PathBuf>,
        max_connections: usize,
    ) -> Self {
        Self {
            api,
            downloader,
            root: root.into(),
            max_connections: max_connections.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloads everything published since the stored cursor.
    ///
    /// This is the incremental entry point. It performs the following steps:
    ///
    /// 1. Loads the cursor from `store` (a missing file means a full resync)
    /// 2. Lists every dump newer than the cursor
    /// 3. Reconciles the dumps into per-table artifact groups
    /// 4. Writes the latest dump's schema to `<root>/schema.json`
    /// 5. Downloads the groups and, only if all of them succeed, saves the
    ///    latest sequence as the new cursor
    ///
    /// # Arguments
    ///
    /// * `store` - Where the cursor is read from and written back to
    ///
    /// # Returns
    ///
    /// A [`SyncReport`] with the old and new cursor and per-table counts. When
    /// nothing is newer than the cursor the report is empty and nothing is
    /// downloaded. A 404 from the listing becomes the silent
    /// [`SyncError::NoFiles`](crate::SyncError::NoFiles).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dumpsync::{RawConfig, StateStore, Syncer};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = RawConfig::from_toml(&std::fs::read_to_string("config.toml")?)?
    ///     .resolve(&std::env::current_dir()?, |name| std::env::var(name).ok())?;
    /// let syncer = Syncer::from_config(&config)?.with_progress(true);
    /// let report = syncer.sync(&StateStore::new(&config.state_file)).await?;
    /// println!("{} -> {}", report.previous, report.sequence);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn sync(&self, store: &StateStore) -> Result<SyncReport> {
        let state = store.load().await?;
        info!("syncing dumps after sequence {}", state.sequence);

        let dumps = list_dumps_after(&self.api, state.sequence, PAGE_SIZE)
            .await
            .map_err(|e| e.not_found_as_no_files())?;

        let Some(latest) = dumps.first() else {
            info!("no new dumps since sequence {}, nothing to do", state.sequence);
            return Ok(SyncReport {
                previous: state.sequence,
                sequence: state.sequence,
                dumps: 0,
                tables: SyncSummary::new(),
            });
        };
        info!(
            "found {} new dumps, latest is {} (sequence {})",
            dumps.len(),
            latest.dump_id,
            latest.sequence
        );

        let groups = reconcile(&self.api, &dumps).await?;
        self.write_schema(&latest.schema_version).await?;

        let total: usize = groups
            .values()
            .flatten()
            .map(|info| info.artifact.files.len())
            .sum();
        let tables = Orchestrator::new(&self.downloader, &self.root, self.max_connections)
            .with_progress(file_progress(total as u64, self.show_progress))
            .sync(groups)
            .await?;

        store
            .save(SyncState {
                sequence: latest.sequence,
            })
            .await?;
        info!(
            "synced {} tables up to sequence {}",
            tables.len(),
            latest.sequence
        );

        Ok(SyncReport {
            previous: state.sequence,
            sequence: latest.sequence,
            dumps: dumps.len(),
            tables,
        })
    }

    /// Writes the schema document for `version` to `<root>/schema.json`.
    pub async fn write_schema(&self, version: &str) -> Result<()> {
        let schema = self.api.schema(version).await?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(
            self.root.join(SCHEMA_FILE),
            serde_json::to_vec_pretty(&schema)?,
        )
        .await?;
        info!("wrote schema version {}", version);
        Ok(())
    }
}
