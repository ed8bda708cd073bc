//! Grouping the historical `requests` exports by time range.

use crate::api::ExportApi;
use crate::download::FileSource;
use crate::error::Result;
use crate::sync::Syncer;
use crate::types::{SyncFile, SyncManifest};
use std::collections::BTreeMap;
use tracing::warn;

pub const REQUESTS_TABLE: &str = "requests";

/// Time range segment of a requests file URL,
/// `https://<bucket>/<account>/requests/<range>/0/part-<uuid>.gz`.
pub fn range_for_url(url: &str) -> Option<&str> {
    url.split('/').nth(5).filter(|s| !s.is_empty())
}

/// Full (non-partial) `requests` files of the manifest, keyed by range.
pub fn group_by_range(manifest: &SyncManifest) -> BTreeMap<String, Vec<SyncFile>> {
    let mut ranges: BTreeMap<String, Vec<SyncFile>> = BTreeMap::new();
    for file in manifest
        .files
        .iter()
        .filter(|f| f.table == REQUESTS_TABLE && !f.partial)
    {
        match range_for_url(&file.url) {
            Some(range) => ranges.entry(range.to_string()).or_default().push(file.clone()),
            None => warn!("no range in url {}", file.url),
        }
    }
    ranges
}

impl<A: ExportApi, S: FileSource> Syncer<A, S> {
    /// Groups the current manifest's historical requests files by time range.
    pub async fn historical_requests(&self) -> Result<BTreeMap<String, Vec<SyncFile>>> {
        let manifest = self
            .api
            .sync_manifest()
            .await
            .map_err(|e| e.not_found_as_no_files())?;
        Ok(group_by_range(&manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::FileDownloader;
    use crate::error::SyncError;
    use crate::testing::{fast_retry, FakeApi, ScriptedSource};

    fn file(table: &str, range: &str, part: &str, partial: bool) -> SyncFile {
        SyncFile {
            table: table.to_string(),
            filename: format!("{}.gz", part),
            url: format!(
                "https://bucket.s3.amazonaws.com/account/{}/{}/0/{}",
                table, range, part
            ),
            partial,
        }
    }

    fn manifest(files: Vec<SyncFile>) -> SyncManifest {
        SyncManifest {
            schema_version: "1.0.1".to_string(),
            incomplete: false,
            files,
        }
    }

    fn syncer(api: FakeApi) -> Syncer<FakeApi, ScriptedSource> {
        Syncer::new(
            api,
            FileDownloader::new(ScriptedSource::default(), fast_retry(1)),
            "unused",
            5,
        )
    }

    #[test]
    fn test_range_for_url() {
        assert_eq!(
            range_for_url("https://bucket.s3.amazonaws.com/account/requests/r-1/0/part-1"),
            Some("r-1")
        );
        assert_eq!(range_for_url("https://bucket/short"), None);
    }

    #[test]
    fn test_partial_files_are_ignored() {
        let ranges = group_by_range(&manifest(vec![file("requests", "daily", "part-1", true)]));
        assert!(ranges.is_empty());
    }

    #[tokio::test]
    async fn test_groups_full_requests_files_of_the_manifest() {
        let api = FakeApi {
            manifest: Some(manifest(vec![
                file("requests", "range-1", "part-1", false),
                file("account_dim", "range-1", "part-9", false),
                file("requests", "range-1", "part-2", false),
                file("requests", "range-2", "part-3", false),
                file("requests", "range-1", "part-4", true),
            ])),
            ..FakeApi::default()
        };

        let ranges = syncer(api).historical_requests().await.unwrap();

        assert_eq!(ranges.len(), 2);
        assert_eq!(
            ranges["range-1"],
            vec![
                file("requests", "range-1", "part-1", false),
                file("requests", "range-1", "part-2", false)
            ]
        );
        assert_eq!(
            ranges["range-2"],
            vec![file("requests", "range-2", "part-3", false)]
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_is_no_files() {
        let err = syncer(FakeApi::default())
            .historical_requests()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoFiles));
    }
}
