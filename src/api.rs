//! Signed client for the export API.

use crate::auth::{self, SignedParts};
use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use crate::types::{Dump, DumpFiles, SyncManifest, TableHistory};
use reqwest::header::{ACCEPT, AUTHORIZATION, DATE};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;

/// The export API operations the sync modes depend on.
///
/// [`ApiClient`] is the production implementation; tests provide in-memory
/// fakes.
pub trait ExportApi: Send + Sync {
    /// Dumps with a sequence strictly greater than `after`, at most `limit`,
    /// newest first.
    fn list_dumps(&self, after: u64, limit: usize)
        -> impl Future<Output = Result<Vec<Dump>>> + Send;

    /// Artifacts of one dump, keyed by table.
    fn artifacts_for_dump(&self, dump_id: &str) -> impl Future<Output = Result<DumpFiles>> + Send;

    /// Every artifact ever published for a table.
    fn files_for_table(&self, table: &str) -> impl Future<Output = Result<TableHistory>> + Send;

    /// Current authoritative file set for a full mirror.
    fn sync_manifest(&self) -> impl Future<Output = Result<SyncManifest>> + Send;

    /// Schema document for a schema version.
    fn schema(&self, version: &str) -> impl Future<Output = Result<serde_json::Value>> + Send;
}

/// HMAC-signed HTTP client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base: Url,
    key: String,
    secret: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base = Url::parse(&config.api_url)
            .map_err(|e| SyncError::Config(format!("invalid api_url {}: {}", config.api_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("dumpsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            key: config.key.clone(),
            secret: config.secret.clone(),
        })
    }

    /// The underlying HTTP client, shared with the file downloader.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn build_url(&self, route: &str, query: &[(String, String)]) -> Url {
        let mut url = self.base.clone();
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            route.trim_start_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Issues a signed GET and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = self.build_url(route, query);
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        let date = auth::http_date(chrono::Utc::now());
        let parts = SignedParts {
            method: "GET",
            host: &host,
            content_type: None,
            content_md5: None,
            path: url.path(),
            query,
        };
        let signature = auth::signature(&self.secret, &date, &parts)?;

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(DATE, date)
            .header(AUTHORIZATION, auth::authorization(&self.key, &signature))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ExportApi for ApiClient {
    async fn list_dumps(&self, after: u64, limit: usize) -> Result<Vec<Dump>> {
        let query = vec![
            ("after".to_string(), after.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        self.get_json("account/self/dump", &query).await
    }

    async fn artifacts_for_dump(&self, dump_id: &str) -> Result<DumpFiles> {
        self.get_json(&format!("account/self/file/byDump/{}", dump_id), &[])
            .await
    }

    async fn files_for_table(&self, table: &str) -> Result<TableHistory> {
        self.get_json(&format!("account/self/file/byTable/{}", table), &[])
            .await
    }

    async fn sync_manifest(&self) -> Result<SyncManifest> {
        self.get_json("account/self/file/sync", &[]).await
    }

    async fn schema(&self, version: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("schema/{}", version), &[]).await
    }
}
