//! Full mirror against the provider's sync manifest.

use crate::api::ExportApi;
use crate::download::{DownloadContext, FileSource};
use crate::error::{Result, SyncError};
use crate::layout::{safe_component, table_dir};
use crate::progress::file_progress;
use crate::sweep::sweep_stale_files;
use crate::sync::Syncer;
use crate::types::{DownloadLink, SyncFile};
use futures_util::{stream, StreamExt};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Outcome of a full mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub downloaded: usize,
    pub cached: usize,
    pub removed: usize,
}

enum Fetched {
    Downloaded,
    Cached,
}

impl<A: ExportApi, S: FileSource> Syncer<A, S> {
    /// Makes `<root>/<table>/<filename>` match the manifest exactly.
    ///
    /// Files already on disk are kept. Failed files are collected rather than
    /// aborting the run; if any failed, nothing is swept and the run fails
    /// with [`SyncError::IncompleteMirror`].
    pub async fn mirror(&self) -> Result<MirrorReport> {
        let manifest = self
            .api
            .sync_manifest()
            .await
            .map_err(|e| e.not_found_as_no_files())?;
        if manifest.incomplete {
            warn!("manifest is incomplete, some tables may be missing until the next export");
        }
        self.write_schema(&manifest.schema_version).await?;

        let pb = file_progress(manifest.files.len() as u64, self.show_progress);
        pb.set_message("📦 Mirroring files");
        let results: Vec<(&SyncFile, Result<Fetched>)> = stream::iter(&manifest.files)
            .map(|file| {
                let pb = &pb;
                async move {
                    let result = self.mirror_file(file).await;
                    pb.inc(1);
                    (file, result)
                }
            })
            .buffer_unordered(self.max_connections)
            .collect()
            .await;

        let mut report = MirrorReport::default();
        let mut failed = 0;
        for (file, result) in results {
            match result {
                Ok(Fetched::Downloaded) => report.downloaded += 1,
                Ok(Fetched::Cached) => report.cached += 1,
                Err(e) => {
                    error!(table = %file.table, filename = %file.filename, "failed to mirror file: {}", e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            pb.abandon_with_message("❌ Mirror incomplete");
            return Err(SyncError::IncompleteMirror { failed });
        }
        pb.finish_with_message("✅ Mirror complete");
        info!(
            "downloaded {} files, {} already present",
            report.downloaded, report.cached
        );

        let keep = manifest
            .files
            .iter()
            .map(|f| (f.table.as_str(), f.filename.as_str()));
        report.removed = sweep_stale_files(&self.root, keep).await?.len();
        Ok(report)
    }

    async fn mirror_file(&self, file: &SyncFile) -> Result<Fetched> {
        let dir = table_dir(&self.root, &file.table)?;
        let dest = dir.join(safe_component(&file.filename)?);
        if tokio::fs::try_exists(&dest).await? {
            return Ok(Fetched::Cached);
        }

        tokio::fs::create_dir_all(&dir).await?;
        let tmp = PathBuf::from(format!("{}.tmp", dest.display()));
        let link = DownloadLink {
            url: file.url.clone(),
            filename: file.filename.clone(),
        };
        let ctx = DownloadContext {
            table: &file.table,
            sequence: 0,
        };
        self.downloader.download(&link, &tmp, ctx).await?;
        tokio::fs::rename(&tmp, &dest).await?;
        Ok(Fetched::Downloaded)
    }
}
