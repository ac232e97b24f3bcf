//! Image downloads from third-party hosts (NFT artwork)

use crate::http::{build_http_client, ensure_success, redact_url, DEFAULT_REQUEST_TIMEOUT};
use async_trait::async_trait;
use bytes::BytesMut;
use pecoin_core::{Error, FetchedImage, ImageOrigin, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, instrument, warn};

/// Plain GET against the image URL, with a hard cap on the body size
pub struct HttpImageOrigin {
    http: Client,
    max_bytes: usize,
}

impl HttpImageOrigin {
    pub fn new(max_bytes: usize) -> Result<Self> {
        Ok(Self {
            http: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            max_bytes,
        })
    }
}

fn too_large(size: u64, max_bytes: usize) -> Error {
    Error::InvalidData(format!("image exceeds {} bytes (got {})", max_bytes, size))
}

/// Reject a declared length over the cap before reading anything
fn check_declared_length(declared: Option<u64>, max_bytes: usize) -> Result<()> {
    match declared {
        Some(len) if len > max_bytes as u64 => Err(too_large(len, max_bytes)),
        _ => Ok(()),
    }
}

/// Append one body chunk, failing once the total passes the cap
fn append_chunk(body: &mut BytesMut, chunk: &[u8], max_bytes: usize) -> Result<()> {
    let total = body.len() + chunk.len();
    if total > max_bytes {
        return Err(too_large(total as u64, max_bytes));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

#[async_trait]
impl ImageOrigin for HttpImageOrigin {
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::ValidationError(format!(
                "unsupported image URL scheme: {}",
                redact_url(url)
            )));
        }

        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "image/*")
            .send()
            .await?;

        let mut response = ensure_success(response, "Image download").await?;
        if let Err(e) = check_declared_length(response.content_length(), self.max_bytes) {
            warn!("Skipping image download: {}", e);
            return Err(e);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        // Content-Length can be absent or wrong, so the cap also holds while streaming
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            append_chunk(&mut body, &chunk, self.max_bytes)?;
        }
        debug!("Downloaded {} bytes ({})", body.len(), content_type);

        Ok(FetchedImage {
            bytes: body.freeze(),
            content_type,
        })
    }
}
