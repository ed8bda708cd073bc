//! HMAC request signing for the export API.

use crate::error::{Result, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The parts of a request covered by the signature.
#[derive(Debug, Clone)]
pub struct SignedParts<'a> {
    pub method: &'a str,
    /// Host with port, if the URL carries one.
    pub host: &'a str,
    pub content_type: Option<&'a str>,
    pub content_md5: Option<&'a str>,
    pub path: &'a str,
    pub query: &'a [(String, String)],
}

/// Formats a timestamp the way the `Date` header expects it.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the newline-joined string that gets signed.
pub fn build_message(secret: &str, timestamp: &str, parts: &SignedParts<'_>) -> String {
    let mut query: Vec<&(String, String)> = parts.query.iter().collect();
    query.sort_by(|a, b| a.0.cmp(&b.0));
    let sorted_query = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    [
        parts.method.to_uppercase().as_str(),
        parts.host,
        parts.content_type.unwrap_or(""),
        parts.content_md5.unwrap_or(""),
        parts.path,
        sorted_query.as_str(),
        timestamp,
        secret,
    ]
    .join("\n")
}

/// Base64 HMAC-SHA256 signature of the request.
pub fn signature(secret: &str, timestamp: &str, parts: &SignedParts<'_>) -> Result<String> {
    let message = build_message(secret, timestamp, parts);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SyncError::Config(format!("unusable API secret: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Value of the `Authorization` header.
pub fn authorization(key: &str, signature: &str) -> String {
    format!("HMACAuth {}:{}", key, signature)
}
