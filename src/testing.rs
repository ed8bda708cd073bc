//! In-memory fakes shared by the unit tests.

use crate::api::ExportApi;
use crate::config::RetryConfig;
use crate::download::{ByteStream, FileSource};
use crate::error::{Result, SyncError};
use crate::types::{
    Artifact, DownloadLink, Dump, DumpFiles, SyncManifest, TableHistory,
};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::ZERO,
        multiplier: 2.0,
    }
}

pub(crate) fn file_url(sequence: u64, table: &str, filename: &str) -> String {
    format!("http://files/{}/{}/{}", sequence, table, filename)
}

pub(crate) fn artifact(sequence: u64, table: &str, partial: bool, files: &[&str]) -> Artifact {
    Artifact {
        table_name: table.to_string(),
        partial,
        files: files
            .iter()
            .map(|f| DownloadLink {
                url: file_url(sequence, table, f),
                filename: f.to_string(),
            })
            .collect(),
    }
}

pub(crate) fn dump(sequence: u64) -> Dump {
    Dump {
        dump_id: format!("dump-{}", sequence),
        sequence,
        account_id: Some("customer_account_id".to_string()),
        num_files: None,
        finished: Some(true),
        expires: None,
        created_at: None,
        updated_at: None,
        schema_version: "1.0.1".to_string(),
    }
}

/// `(table, partial, files)` triples of one dump.
pub(crate) type TableSpec<'a> = (&'a str, bool, &'a [&'a str]);

pub(crate) fn dump_files(sequence: u64, tables: &[TableSpec<'_>]) -> DumpFiles {
    DumpFiles {
        dump_id: format!("dump-{}", sequence),
        sequence,
        schema_version: Some("1.0.1".to_string()),
        artifacts_by_table: tables
            .iter()
            .map(|(table, partial, files)| {
                (table.to_string(), artifact(sequence, table, *partial, files))
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Export API backed by in-memory dumps.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub(crate) dumps: Vec<Dump>,
    pub(crate) files: HashMap<String, DumpFiles>,
    pub(crate) tables: HashMap<String, TableHistory>,
    pub(crate) manifest: Option<SyncManifest>,
    pub(crate) failing_dump: Option<String>,
    pub(crate) failing_list: Option<u16>,
    pub(crate) list_calls: Mutex<Vec<u64>>,
    pub(crate) artifact_calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub(crate) fn with_dump(mut self, sequence: u64, tables: &[TableSpec<'_>]) -> Self {
        let d = dump(sequence);
        self.files
            .insert(d.dump_id.clone(), dump_files(sequence, tables));
        self.dumps.push(d);
        self
    }
}

impl ExportApi for FakeApi {
    async fn list_dumps(&self, after: u64, limit: usize) -> Result<Vec<Dump>> {
        self.list_calls.lock().unwrap().push(after);
        if let Some(status) = self.failing_list {
            return Err(SyncError::Status {
                status,
                body: "something wrong".to_string(),
            });
        }
        let mut newer: Vec<Dump> = self
            .dumps
            .iter()
            .filter(|d| d.sequence > after)
            .cloned()
            .collect();
        newer.sort_by_key(|d| d.sequence);
        newer.truncate(limit);
        newer.reverse();
        Ok(newer)
    }

    async fn artifacts_for_dump(&self, dump_id: &str) -> Result<DumpFiles> {
        self.artifact_calls.lock().unwrap().push(dump_id.to_string());
        if self.failing_dump.as_deref() == Some(dump_id) {
            return Err(SyncError::Status {
                status: 500,
                body: "something wrong".to_string(),
            });
        }
        self.files.get(dump_id).cloned().ok_or(SyncError::Status {
            status: 404,
            body: format!("no dump {}", dump_id),
        })
    }

    async fn files_for_table(&self, table: &str) -> Result<TableHistory> {
        self.tables.get(table).cloned().ok_or(SyncError::Status {
            status: 404,
            body: format!("no table {}", table),
        })
    }

    async fn sync_manifest(&self) -> Result<SyncManifest> {
        self.manifest.clone().ok_or(SyncError::Status {
            status: 404,
            body: "no files".to_string(),
        })
    }

    async fn schema(&self, version: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "version": version, "schema": {} }))
    }
}

/// Scripted responses per URL; once a script runs out the last response
/// repeats. `Err(status)` answers with that HTTP status.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Result<Vec<Bytes>, u16>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub(crate) fn serve(self, url: &str, body: &str) -> Self {
        self.script(url, vec![Ok(vec![Bytes::from(body.to_string())])])
    }

    pub(crate) fn script(self, url: &str, responses: Vec<Result<Vec<Bytes>, u16>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl FileSource for ScriptedSource {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        self.calls.lock().unwrap().push(url.to_string());
        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(url) {
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().cloned(),
                None => None,
            }
        };
        match next {
            Some(Ok(chunks)) => Ok(Box::pin(futures_util::stream::iter(
                chunks.into_iter().map(Ok::<Bytes, SyncError>),
            ))),
            Some(Err(status)) => Err(SyncError::Status {
                status,
                body: String::new(),
            }),
            None => Err(SyncError::Status {
                status: 404,
                body: format!("no script for {}", url),
            }),
        }
    }
}

/// Serves every URL after a delay, recording how many opens overlap and the
/// order in which they start and finish.
#[derive(Default)]
pub(crate) struct TrackingSource {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl TrackingSource {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// `start <url>` / `end <url>` entries in the order they happened.
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl FileSource for TrackingSource {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("start {}", url));
        tokio::time::sleep(self.delay).await;
        self.events.lock().unwrap().push(format!("end {}", url));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Box::pin(futures_util::stream::iter([Ok::<Bytes, SyncError>(
            Bytes::from(url.to_string()),
        )])))
    }
}
