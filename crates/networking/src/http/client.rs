//! Shared reqwest client construction and response handling

use pecoin_core::{Error, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, Response,
};
use std::time::Duration;
use tracing::error;

const USER_AGENT_VALUE: &str = concat!("pecoin-dashboard/", env!("CARGO_PKG_VERSION"));

/// Upper bound for any single request. Callers layer tighter
/// per-operation budgets on top of this.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client used by every collaborator
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*"));

    Client::builder()
        .user_agent(USER_AGENT_VALUE)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| Error::NetworkError(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into `ApiError`, keeping a short body preview
pub async fn ensure_success(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(200).collect();
    error!("{} failed: HTTP {} {}", context, status, preview);
    Err(Error::ApiError(format!("{}: HTTP {}", context, status)))
}

/// Strip query string and credentials from a URL before logging it
pub fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.path()
        ),
        Err(_) => "<invalid url>".to_string(),
    }
}
