use async_trait::async_trait;

use crate::config::Config;
use crate::error::AppError;
use crate::rest::{ok_or_reject, service_headers};

/// Bucket holding profile avatars.
pub const PROFILE_BUCKET: &str = "profiles";

/// Object storage collaborator for photo uploads.
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), AppError>;

    /// Public URL for an object. String assembly only, no remote call.
    fn public_url(&self, path: &str) -> String;
}

pub struct StorageHttp {
    http: reqwest::Client,
    base: String,
    anon_key: String,
    bucket: String,
}

impl StorageHttp {
    pub fn new(http: reqwest::Client, config: &Config, bucket: &str) -> Self {
        Self {
            http,
            base: config.service_url.clone(),
            anon_key: config.anon_key.clone(),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageApi for StorageHttp {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        let resp = self
            .http
            .post(format!(
                "{}/storage/v1/object/{}/{path}",
                self.base, self.bucket
            ))
            .headers(service_headers(&self.anon_key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        ok_or_reject(resp).await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.base, self.bucket
        )
    }
}
