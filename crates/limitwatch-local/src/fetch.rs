use futures_util::StreamExt;
use limitwatch_core::{Error, Result};
use serde::Serialize;
use std::time::Duration;

/// A fetched page document, bounded and ready for detection.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedDocument {
    pub url: String,
    /// URL after redirects; this is what the page itself would see.
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub truncated: bool,
}

/// GET `page_url` and return its body as text, reading at most `max_bytes`.
///
/// Notes:
/// - Explicit connect/read timeouts so a stalled provider cannot hang a
///   one-shot check; `timeout_ms` is clamped to a sane range.
/// - Non-success statuses are returned as-is. The limit page itself is
///   served with a success status, so the caller decides what to inspect.
pub async fn fetch_document(
    page_url: &str,
    timeout_ms: u64,
    max_bytes: u64,
) -> Result<FetchedDocument> {
    let url = url::Url::parse(page_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("limitwatch/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_millis(timeout_ms.clamp(1_000, 60_000)))
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Fetch(e.to_string()))?;
    let final_url = resp.url().to_string();
    let status = resp.status().as_u16();

    let max_bytes = max_bytes as usize;
    let mut bytes: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
        if bytes.len().saturating_add(chunk.len()) > max_bytes {
            let can_take = max_bytes.saturating_sub(bytes.len());
            bytes.extend_from_slice(&chunk[..can_take]);
            truncated = true;
            break;
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(FetchedDocument {
        url: page_url.to_string(),
        final_url,
        status,
        html: String::from_utf8_lossy(&bytes).to_string(),
        truncated,
    })
}
