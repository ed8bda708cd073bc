//! One-off downloads: a table's whole history, or one dump.

use crate::api::ExportApi;
use crate::download::{DownloadContext, FileSource};
use crate::error::{Result, SyncError};
use crate::layout::{artifact_file_name, safe_component, table_dir};
use crate::progress::file_progress;
use crate::sync::Syncer;
use crate::types::DownloadLink;
use futures_util::{stream, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tracing::info;

struct Job<'a> {
    link: &'a DownloadLink,
    dest: PathBuf,
    table: &'a str,
    sequence: u64,
}

impl<'a> Job<'a> {
    fn new(dir: &Path, link: &'a DownloadLink, table: &'a str, sequence: u64) -> Result<Self> {
        Ok(Self {
            link,
            dest: dir.join(artifact_file_name(sequence, &link.filename)?),
            table,
            sequence,
        })
    }
}

impl<A: ExportApi, S: FileSource> Syncer<A, S> {
    /// Downloads every file ever published for `table` into
    /// `<root>/<table>/<sequence>_<filename>`. Returns the file count.
    pub async fn fetch_table(&self, table: &str) -> Result<usize> {
        let history = self
            .api
            .files_for_table(table)
            .await
            .map_err(|e| e.not_found_as_no_files())?;
        let dir = table_dir(&self.root, table)?;

        let mut jobs = Vec::new();
        for entry in &history.history {
            for link in &entry.files {
                jobs.push(Job::new(&dir, link, table, entry.sequence)?);
            }
        }
        info!(
            "fetching {} files from {} artifacts of {}",
            jobs.len(),
            history.history.len(),
            table
        );
        self.download_jobs(jobs).await
    }

    /// Downloads every artifact of one dump into
    /// `<root>/<dump_id>/<table>/<sequence>_<filename>`. Returns the file count.
    pub async fn grab_dump(&self, dump_id: &str) -> Result<usize> {
        let dump = self.api.artifacts_for_dump(dump_id).await?;
        let dump_root = self.root.join(safe_component(dump_id)?);

        let mut jobs = Vec::new();
        for (table, artifact) in &dump.artifacts_by_table {
            let dir = table_dir(&dump_root, table)?;
            for link in &artifact.files {
                jobs.push(Job::new(&dir, link, table, dump.sequence)?);
            }
        }
        info!(
            "grabbing {} files from {} tables of dump {}",
            jobs.len(),
            dump.artifacts_by_table.len(),
            dump_id
        );
        self.download_jobs(jobs).await
    }

    async fn download_jobs(&self, jobs: Vec<Job<'_>>) -> Result<usize> {
        let pb = file_progress(jobs.len() as u64, self.show_progress);
        let result: Result<Vec<u64>> = stream::iter(jobs)
            .map(|job| {
                let pb = &pb;
                async move {
                    if let Some(parent) = job.dest.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    let ctx = DownloadContext {
                        table: job.table,
                        sequence: job.sequence,
                    };
                    pb.set_message(format!("| ⬇️  Downloading: {}", job.link.filename));
                    let bytes = self.downloader.download(job.link, &job.dest, ctx).await?;
                    pb.inc(1);
                    Ok::<u64, SyncError>(bytes)
                }
            })
            .buffer_unordered(self.max_connections)
            .try_collect()
            .await;

        match result {
            Ok(sizes) => {
                pb.finish_with_message("✅ Download complete");
                Ok(sizes.len())
            }
            Err(e) => {
                pb.abandon_with_message("❌ Download failed!");
                Err(e)
            }
        }
    }
}
