//! # Geocoding
//!
//! Forward and reverse geocoding through the OpenStreetMap Nominatim API,
//! plus the search box plumbing on top of it.
//!
//! ## Wire format
//!
//! - Forward: `GET {base}/search?format=json&q=<query>&limit=5` returns a list
//!   of `{place_id, display_name, lat, lon}`
//! - Reverse: `GET {base}/reverse?format=json&lat=<lat>&lon=<lon>` returns one
//!   such place
//!
//! Coordinates arrive as JSON strings and stay strings on the wire model, a
//! parsing accessor covers the callers that need numbers. No API key, rate
//! limits are the collaborator's concern and only show up here as user-visible
//! error text.
//!
//! ## Debounce
//!
//! The search box re-arms a quiet window on every keystroke and only the
//! query left standing after 500 ms is dispatched. Responses are not
//! sequenced, a slow earlier response landing after a faster later one
//! overwrites it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::warn;

use crate::config::Config;
use crate::error::AppError;
use crate::rest::ok_or_reject;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const SEARCH_RESULT_LIMIT: u32 = 5;

/// One match from the geocoding collaborator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationCandidate {
    #[serde(default)]
    pub place_id: u64,
    pub display_name: String,
    pub lat: String,
    pub lon: String,
}

impl LocationCandidate {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat.parse().ok()?, self.lon.parse().ok()?))
    }
}

/// Device geolocation seam, the host shell supplies the real source.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<(f64, f64), GeolocationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeolocationError {
    /// The user declined the permission prompt.
    Denied,
    /// The device could not produce a fix.
    Unavailable,
}

#[async_trait]
pub trait GeocodeApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<LocationCandidate>, AppError>;

    async fn reverse(&self, lat: f64, lon: f64) -> Result<LocationCandidate, AppError>;
}

/// HTTP implementation against a Nominatim instance.
pub struct GeocodeHttp {
    http: reqwest::Client,
    base: String,
}

impl GeocodeHttp {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base: config.geocode_url.clone(),
        }
    }
}

#[async_trait]
impl GeocodeApi for GeocodeHttp {
    async fn search(&self, query: &str) -> Result<Vec<LocationCandidate>, AppError> {
        let limit = SEARCH_RESULT_LIMIT.to_string();
        let resp = self
            .http
            .get(format!("{}/search", self.base))
            .query(&[("format", "json"), ("q", query), ("limit", limit.as_str())])
            .send()
            .await?;

        Ok(ok_or_reject(resp).await?.json().await?)
    }

    async fn reverse(&self, lat: f64, lon: f64) -> Result<LocationCandidate, AppError> {
        let resp = self
            .http
            .get(format!("{}/reverse", self.base))
            .query(&[
                ("format", "json".to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
            ])
            .send()
            .await?;

        Ok(ok_or_reject(resp).await?.json().await?)
    }
}

/// Search box operations over the geocoding collaborator.
pub struct LocationSearch {
    api: Arc<dyn GeocodeApi>,
}

impl LocationSearch {
    pub fn new(api: Arc<dyn GeocodeApi>) -> Self {
        Self { api }
    }

    /// Empty and whitespace-only queries resolve to no candidates without a
    /// remote call.
    pub async fn search(&self, query: &str) -> Result<Vec<LocationCandidate>, AppError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.api.search(query).await.map_err(|err| {
            warn!("location search failed: {err}");
            AppError::RemoteRejected("Failed to search locations. Please try again.".to_string())
        })
    }

    /// Resolve the device position and reverse-geocode it into an address.
    /// Permission denial and device failure surface as distinct errors.
    pub async fn current_location(
        &self,
        geo: &dyn GeolocationProvider,
    ) -> Result<LocationCandidate, AppError> {
        let (lat, lon) = geo.current_position().await.map_err(|err| match err {
            GeolocationError::Denied => AppError::PermissionDenied,
            GeolocationError::Unavailable => AppError::Unavailable,
        })?;

        self.api.reverse(lat, lon).await.map_err(|err| {
            warn!("reverse geocoding failed: {err}");
            AppError::RemoteRejected(
                "Failed to get your current location. Please try again.".to_string(),
            )
        })
    }
}

/// Trailing-edge debounce for the search box. Every keystroke re-arms the
/// quiet window, only the query left standing when it elapses is dispatched,
/// and its outcome lands on the results channel.
pub struct Debouncer {
    search: Arc<LocationSearch>,
    results: UnboundedSender<Result<Vec<LocationCandidate>, AppError>>,
    quiet: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(
        search: Arc<LocationSearch>,
        results: UnboundedSender<Result<Vec<LocationCandidate>, AppError>>,
    ) -> Self {
        Self {
            search,
            results,
            quiet: SEARCH_DEBOUNCE,
            pending: None,
        }
    }

    /// Record a keystroke.
    pub fn push(&mut self, query: &str) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }

        let search = Arc::clone(&self.search);
        let results = self.results.clone();
        let query = query.to_owned();
        let quiet = self.quiet;

        self.pending = Some(tokio::spawn(async move {
            sleep(quiet).await;
            let _ = results.send(search.search(&query).await);
        }));
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
