//! Data structures exchanged with the export API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A provider-published bundle of table artifacts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dump {
    pub dump_id: String,
    /// Total order key for reconciliation and the sync cursor.
    pub sequence: u64,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub num_files: Option<u64>,
    #[serde(default)]
    pub finished: Option<bool>,
    /// Sent as epoch milliseconds, unlike the RFC 3339 timestamps below.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub schema_version: String,
}

/// A file belonging to an artifact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub url: String,
    pub filename: String,
}

/// One table's contribution to a dump.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub table_name: String,
    /// `true` for an increment over the nearest older full snapshot.
    pub partial: bool,
    pub files: Vec<DownloadLink>,
}

/// The artifacts of a single dump, keyed by table name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DumpFiles {
    pub dump_id: String,
    pub sequence: u64,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub artifacts_by_table: BTreeMap<String, Artifact>,
}

/// One entry in a table's history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableHistoryEntry {
    pub dump_id: String,
    pub sequence: u64,
    pub partial: bool,
    pub files: Vec<DownloadLink>,
}

/// Every published artifact of one table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TableHistory {
    pub table: String,
    pub history: Vec<TableHistoryEntry>,
}

/// A file in the full-mirror manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncFile {
    pub table: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub partial: bool,
}

/// The authoritative file set for a full mirror.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    pub schema_version: String,
    #[serde(default)]
    pub incomplete: bool,
    pub files: Vec<SyncFile>,
}

/// An artifact selected for download, tagged with its dump sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub sequence: u64,
    pub table_name: String,
    pub artifact: Artifact,
}

/// Persisted cross-run state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Last successfully synced dump sequence; 0 means full history.
    #[serde(default)]
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_deserializes_provider_fields() {
        let dump: Dump = serde_json::from_str(
            r#"{
                "dumpId": "1234",
                "sequence": 7,
                "accountId": "customer_account_id",
                "numFiles": 10,
                "finished": true,
                "createdAt": "2015-10-24T00:00:00.000Z",
                "schemaVersion": "1.0.1"
            }"#,
        )
        .unwrap();
        assert_eq!(dump.sequence, 7);
        assert_eq!(dump.schema_version, "1.0.1");
        assert_eq!(dump.num_files, Some(10));
        assert!(dump.expires.is_none());
    }

    #[test]
    fn test_dump_page_with_epoch_millis_expiry() {
        let dumps: Vec<Dump> = serde_json::from_str(
            r#"[{
                "dumpId": "1234",
                "sequence": 0,
                "accountId": "customer_account_id",
                "numFiles": 10,
                "finished": true,
                "expires": 1440000000000,
                "updatedAt": "2015-10-24T00:00:00.000Z",
                "createdAt": "2015-10-24T00:00:00.000Z",
                "schemaVersion": "1.0.1"
            }, {
                "dumpId": "5678",
                "sequence": 1,
                "expires": null,
                "schemaVersion": "1.0.1"
            }]"#,
        )
        .unwrap();

        assert_eq!(
            dumps[0].expires.map(|t| t.timestamp_millis()),
            Some(1_440_000_000_000)
        );
        assert_eq!(
            dumps[0].updated_at.map(|t| t.to_rfc3339()),
            Some("2015-10-24T00:00:00+00:00".to_string())
        );
        assert!(dumps[1].expires.is_none());

        // written back out the same way for `list --json`
        let json = serde_json::to_value(&dumps[0]).unwrap();
        assert_eq!(json["expires"], serde_json::json!(1_440_000_000_000_i64));
    }

    #[test]
    fn test_empty_state_defaults_to_zero() {
        let state: SyncState = serde_json::from_str("{}").unwrap();
        assert_eq!(state.sequence, 0);
    }
}
