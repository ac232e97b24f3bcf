//! Supabase Storage client for signed logo URLs

use crate::http::{build_http_client, ensure_success, DEFAULT_REQUEST_TIMEOUT};
use async_trait::async_trait;
use pecoin_core::{Error, Result, UrlSigner};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

/// Signs object paths in one storage bucket
pub struct SupabaseStorage {
    http: Client,
    project_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(project_url: &str, service_key: &str, bucket: &str) -> Result<Self> {
        if project_url.trim().is_empty() || bucket.trim().is_empty() {
            return Err(Error::ConfigError(
                "storage project URL and bucket are required".to_string(),
            ));
        }
        Ok(Self {
            http: build_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            project_url: project_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// Object path relative to the bucket; tolerates a leading slash or bucket name
    fn object_path<'a>(&self, path: &'a str) -> &'a str {
        let path = path.trim_start_matches('/');
        path.strip_prefix(self.bucket.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(path)
    }

    fn absolute(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/storage/v1{}", self.project_url, signed)
        }
    }
}

#[async_trait]
impl UrlSigner for SupabaseStorage {
    #[instrument(skip(self))]
    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> Result<String> {
        let object = self.object_path(path);
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.project_url, self.bucket, object
        );

        debug!("Signing {} for {}s", object, expires_in.as_secs());

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await?;

        let response = ensure_success(response, "Storage sign").await?;

        let body: SignResponse = response.json().await.map_err(|e| {
            error!("Failed to parse sign response for {}: {}", object, e);
            Error::InvalidData(e.to_string())
        })?;

        Ok(self.absolute(&body.signed_url))
    }
}
