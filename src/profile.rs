//! Profile management: the `profiles` row behind the dashboard greeting and
//! the avatar upload chain (object upload, public URL, row upsert).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::rest::{PREFER_UPSERT, ok_or_reject, service_headers};
use crate::storage::StorageApi;

/// A row in the `profiles` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Upsert payload. Absent fields are left untouched by the store.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProfilesApi: Send + Sync {
    /// Absent row is `Ok(None)`, fresh accounts have no profile yet.
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;

    async fn upsert(&self, update: ProfileUpdate) -> Result<(), AppError>;
}

pub struct ProfileManager {
    profiles: Arc<dyn ProfilesApi>,
    storage: Arc<dyn StorageApi>,
}

impl ProfileManager {
    pub fn new(profiles: Arc<dyn ProfilesApi>, storage: Arc<dyn StorageApi>) -> Self {
        Self { profiles, storage }
    }

    pub async fn fetch(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        self.profiles.fetch(user_id).await
    }

    pub async fn save(&self, user_id: Uuid, name: &str, phone: &str) -> Result<(), AppError> {
        self.profiles
            .upsert(ProfileUpdate {
                id: user_id,
                name: Some(name.to_string()),
                phone: Some(phone.to_string()),
                avatar_url: None,
                updated_at: Utc::now(),
            })
            .await
    }

    /// Upload the picked file under a fresh object name, then point the
    /// profile row at its public URL. A failed upsert after a successful
    /// upload reports the upsert's error.
    pub async fn upload_avatar(
        &self,
        user_id: Uuid,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AppError> {
        let ext = file_name.rsplit('.').next().unwrap_or("jpg");
        let path = format!("avatars/{user_id}-{}.{ext}", Uuid::new_v4().simple());

        self.storage.upload(&path, bytes, content_type).await?;
        let url = self.storage.public_url(&path);

        self.profiles
            .upsert(ProfileUpdate {
                id: user_id,
                name: None,
                phone: None,
                avatar_url: Some(url.clone()),
                updated_at: Utc::now(),
            })
            .await?;

        Ok(url)
    }
}

/// Dashboard greeting: the profile name when set, else the email local part,
/// else a generic fallback.
pub fn greeting_name(profile: Option<&Profile>, email: &str) -> String {
    if let Some(name) = profile.and_then(|p| p.name.as_deref()) {
        if !name.is_empty() {
            return name.to_string();
        }
    }

    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => "User".to_string(),
    }
}

/// HTTP implementation against the hosted store's `profiles` table.
pub struct ProfilesHttp {
    http: reqwest::Client,
    base: String,
    anon_key: String,
}

impl ProfilesHttp {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base: config.service_url.clone(),
            anon_key: config.anon_key.clone(),
        }
    }
}

#[async_trait]
impl ProfilesApi for ProfilesHttp {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let resp = self
            .http
            .get(format!("{}/rest/v1/profiles", self.base))
            .headers(service_headers(&self.anon_key))
            .query(&[
                ("select", "id,name,phone,avatar_url"),
                ("id", format!("eq.{user_id}").as_str()),
            ])
            .send()
            .await?;

        let mut rows: Vec<Profile> = ok_or_reject(resp).await?.json().await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.remove(0)))
    }

    async fn upsert(&self, update: ProfileUpdate) -> Result<(), AppError> {
        let resp = self
            .http
            .post(format!("{}/rest/v1/profiles", self.base))
            .headers(service_headers(&self.anon_key))
            .header("Prefer", PREFER_UPSERT)
            .json(&[update])
            .send()
            .await?;

        ok_or_reject(resp).await?;
        Ok(())
    }
}
