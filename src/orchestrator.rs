//! Driving downloads for reconciled artifact groups.

use crate::download::{DownloadContext, FileDownloader, FileSource};
use crate::error::{Result, SyncError};
use crate::layout::{artifact_file_name, remove_dir_if_exists, table_dir};
use crate::reconcile::ArtifactGroups;
use crate::types::ArtifactInfo;
use futures_util::{stream, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info};

/// Default ceiling for concurrent table groups and concurrent files.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// What was downloaded for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub artifacts: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Per-table download counts of a run.
pub type SyncSummary = BTreeMap<String, TableSummary>;

/// Downloads artifact groups into `<root>/<table>/<sequence>_<filename>`.
///
/// Artifacts of one table are processed strictly in order; different tables
/// and the files of one artifact run concurrently up to `max_connections`.
/// The first fatal error drops every in-flight download of the run.
pub struct Orchestrator<'a, S> {
    downloader: &'a FileDownloader<S>,
    root: PathBuf,
    max_connections: usize,
    pb: ProgressBar,
}

impl<'a, S: FileSource> Orchestrator<'a, S> {
    pub fn new(
        downloader: &'a FileDownloader<S>,
        root: impl Into<PathBuf>,
        max_connections: usize,
    ) -> Self {
        Self {
            downloader,
            root: root.into(),
            max_connections: max_connections.max(1),
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// Downloads every artifact of `groups` into the mirror root.
    ///
    /// For each table the artifacts run oldest first. A full snapshot
    /// removes `<root>/<table>` before its files are fetched; a partial one
    /// adds its files next to what is already there.
    ///
    /// # Arguments
    ///
    /// * `groups` - Per-table artifacts, oldest first, as built by
    ///   [`reconcile`](crate::reconcile::reconcile)
    ///
    /// # Returns
    ///
    /// Per-table counts on success, or the first fatal error. On error the
    /// remaining downloads are dropped; tables that already finished stay on
    /// disk.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dumpsync::{ArtifactGroups, FileDownloader, HttpFileSource, Orchestrator, RetryConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let downloader = FileDownloader::new(
    ///     HttpFileSource::new(reqwest::Client::new()),
    ///     RetryConfig::default(),
    /// );
    /// let summary = Orchestrator::new(&downloader, "./dataFiles", 5)
    ///     .sync(ArtifactGroups::new())
    ///     .await?;
    /// assert!(summary.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn sync(&self, groups: ArtifactGroups) -> Result<SyncSummary> {
        let total_files: usize = groups
            .values()
            .flatten()
            .map(|info| info.artifact.files.len())
            .sum();
        self.pb.set_length(total_files as u64);
        self.pb.set_message(format!(
            "📦 Downloading {} files for {} table(s)",
            total_files,
            groups.len()
        ));

        let result: Result<Vec<(String, TableSummary)>> = stream::iter(groups)
            .map(|(table, group)| async move {
                let summary = self.sync_table(&table, &group).await?;
                Ok::<_, SyncError>((table, summary))
            })
            .buffer_unordered(self.max_connections)
            .try_collect()
            .await;

        match result {
            Ok(summaries) => {
                self.pb.finish_with_message("✅ All artifacts downloaded");
                Ok(summaries.into_iter().collect())
            }
            Err(e) => {
                error!("Download failed: {}", e);
                self.pb.abandon_with_message("❌ Download failed!");
                Err(e)
            }
        }
    }

    async fn sync_table(&self, table: &str, group: &[ArtifactInfo]) -> Result<TableSummary> {
        let mut summary = TableSummary::default();
        for info in group {
            let bytes = self.sync_artifact(info).await?;
            summary.artifacts += 1;
            summary.files += info.artifact.files.len();
            summary.bytes += bytes;
        }
        info!(
            table,
            artifacts = summary.artifacts,
            files = summary.files,
            "table synced"
        );
        Ok(summary)
    }

    /// Materializes one artifact. A full snapshot first wipes the table
    /// directory.
    async fn sync_artifact(&self, info: &ArtifactInfo) -> Result<u64> {
        let dir = table_dir(&self.root, &info.table_name)?;

        if !info.artifact.partial && remove_dir_if_exists(&dir).await? {
            info!(
                table = %info.table_name,
                sequence = info.sequence,
                "removed data superseded by full snapshot"
            );
        }
        tokio::fs::create_dir_all(&dir).await?;

        let mut targets = Vec::with_capacity(info.artifact.files.len());
        for link in &info.artifact.files {
            targets.push((link, dir.join(artifact_file_name(info.sequence, &link.filename)?)));
        }

        let ctx = DownloadContext {
            table: &info.table_name,
            sequence: info.sequence,
        };
        let sizes: Vec<u64> = stream::iter(targets)
            .map(|(link, dest)| async move {
                self.pb.set_message(format!("| ⬇️  Downloading: {}", link.filename));
                let bytes = self.downloader.download(link, &dest, ctx).await?;
                self.pb.inc(1);
                Ok::<u64, SyncError>(bytes)
            })
            .buffer_unordered(self.max_connections)
            .try_collect()
            .await?;

        Ok(sizes.iter().sum())
    }
}
