//! Retrying single-file download.

use crate::config::RetryConfig;
use crate::error::{Result, SyncError};
use crate::types::DownloadLink;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

/// Response body of a file download.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Where file bodies come from.
///
/// Implementations must report a non-2xx response as an error before any
/// bytes are yielded.
pub trait FileSource: Send + Sync {
    fn open(&self, url: &str) -> impl Future<Output = Result<ByteStream>> + Send;
}

/// Plain (unsigned) HTTP GET; artifact URLs are pre-signed by the provider.
#[derive(Debug, Clone, Default)]
pub struct HttpFileSource {
    client: reqwest::Client,
}

impl HttpFileSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl FileSource for HttpFileSource {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|piece| piece.map_err(SyncError::from)),
        ))
    }
}

/// Which table and dump a file belongs to, for log events and errors.
#[derive(Debug, Clone, Copy)]
pub struct DownloadContext<'a> {
    pub table: &'a str,
    pub sequence: u64,
}

/// Downloads one file at a time into a destination path, retrying failed
/// attempts with exponential backoff.
#[derive(Debug, Clone)]
pub struct FileDownloader<S> {
    source: S,
    retry: RetryConfig,
}

impl<S: FileSource> FileDownloader<S> {
    pub fn new(source: S, retry: RetryConfig) -> Self {
        Self { source, retry }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Streams `link` into `dest`, overwriting it.
    ///
    /// Attempts are strictly sequential, with the backoff delays of the
    /// retry policy between them. A non-success status counts as a failed
    /// attempt, and every retry starts the file from scratch.
    ///
    /// # Arguments
    ///
    /// * `link` - The file to fetch
    /// * `dest` - The local path to write to
    /// * `ctx` - Table and dump sequence, attached to log events and errors
    ///
    /// # Returns
    ///
    /// The number of bytes written, or [`SyncError::DownloadExhausted`]
    /// wrapping the last error once `max_attempts` attempts have failed.
    pub async fn download(
        &self,
        link: &DownloadLink,
        dest: &Path,
        ctx: DownloadContext<'_>,
    ) -> Result<u64> {
        let mut attempt = 0u32;

        let result = Retry::spawn(self.retry.delays(), || {
            attempt += 1;
            let current = attempt;
            async move {
                debug!(
                    filename = %link.filename,
                    table = ctx.table,
                    sequence = ctx.sequence,
                    attempt = current,
                    "downloading file"
                );
                match self.fetch_once(&link.url, dest).await {
                    Ok(bytes) => {
                        debug!(
                            filename = %link.filename,
                            table = ctx.table,
                            sequence = ctx.sequence,
                            attempt = current,
                            bytes,
                            "finished downloading file"
                        );
                        Ok(bytes)
                    }
                    Err(e) => {
                        warn!(
                            filename = %link.filename,
                            table = ctx.table,
                            sequence = ctx.sequence,
                            attempt = current,
                            error = %e,
                            "download attempt failed"
                        );
                        RetryError::to_transient(e)
                    }
                }
            }
        })
        .await;

        result.map_err(|e| SyncError::DownloadExhausted {
            filename: link.filename.clone(),
            table: ctx.table.to_string(),
            attempts: attempt,
            source: Box::new(e),
        })
    }

    async fn fetch_once(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut byte_stream = self.source.open(url).await?;
        let mut file = BufWriter::new(tokio::fs::File::create(dest).await?);
        let mut written = 0u64;

        while let Some(piece) = byte_stream.next().await {
            let chunk = piece?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
