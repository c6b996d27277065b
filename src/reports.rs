//! # Report submission
//!
//! Turns user-entered fields into a persisted report with responsive
//! feedback, and keeps a local read-through cache of the signed-in user's
//! reports.
//!
//! ## Flow
//!
//! - Required fields are checked synchronously, an empty one fails before any
//!   remote call
//! - The insert races a 10 second deadline, first settled wins and a late
//!   write is abandoned, not reconciled
//! - On success the record the store returned is prepended to the cached
//!   list, never the local draft, so server-assigned id and timestamps are
//!   what the list shows
//! - On failure the draft stays intact for a user-initiated retry
//!
//! The cached list is owned by one flow instance and only ever changes by
//! prepending a confirmed report, newest first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::deadline::with_deadline;
use crate::error::AppError;
use crate::rest::{PREFER_REPRESENTATION, ok_or_reject, service_headers};

pub const SUBMIT_DEADLINE: Duration = Duration::from_secs(10);

/// One citizen report as returned by the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location: String,
    pub description: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    InProgress,
    Completed,
}

/// Insert payload, stamped client side the way the store expects it.
#[derive(Debug, Clone, Serialize)]
pub struct NewReport {
    pub user_id: Uuid,
    pub location: String,
    pub description: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// A photo picked for upload alongside a report.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The in-progress report being composed in the submission form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub location: String,
    pub description: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait ReportsApi: Send + Sync {
    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Report>, AppError>;

    async fn insert_returning(&self, report: NewReport) -> Result<Report, AppError>;
}

/// Per-form submission state: the draft being edited, the cached report list
/// and the in-flight marker the submit control mirrors.
pub struct SubmissionFlow {
    api: Arc<dyn ReportsApi>,
    user_id: Uuid,
    pub draft: Draft,
    reports: Vec<Report>,
    submitting: bool,
    online: watch::Receiver<bool>,
    deadline: Duration,
}

impl SubmissionFlow {
    pub fn new(api: Arc<dyn ReportsApi>, user_id: Uuid, online: watch::Receiver<bool>) -> Self {
        Self {
            api,
            user_id,
            draft: Draft::default(),
            reports: Vec::new(),
            submitting: false,
            online,
            deadline: SUBMIT_DEADLINE,
        }
    }

    /// Fetch the user's reports once their identity is available. A
    /// collaborator error is logged and shows as an empty list, not a fatal
    /// state.
    pub async fn load_reports(&mut self) {
        match self.api.list_for_user(self.user_id).await {
            Ok(reports) => self.reports = reports,
            Err(err) => warn!("failed to load reports, showing none: {err}"),
        }
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// True while a submission is in flight, the submit control stays
    /// disabled for as long as this holds.
    pub fn submitting(&self) -> bool {
        self.submitting
    }

    /// Validate, persist, and prepend the confirmed record to the cached
    /// list. Failure of any kind leaves the draft untouched.
    pub async fn submit(&mut self) -> Result<Report, AppError> {
        if !*self.online.borrow() {
            return Err(AppError::NetworkUnreachable);
        }
        if self.draft.location.is_empty() {
            return Err(AppError::Validation("location"));
        }
        if self.draft.description.is_empty() {
            return Err(AppError::Validation("description"));
        }

        self.submitting = true;

        let api = Arc::clone(&self.api);
        let report = NewReport {
            user_id: self.user_id,
            location: self.draft.location.clone(),
            description: self.draft.description.clone(),
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        };
        let result = with_deadline("report submission", self.deadline, async move {
            api.insert_returning(report).await
        })
        .await;

        self.submitting = false;

        let saved = result?;
        info!(report = %saved.id, "report submitted");
        self.reports.insert(0, saved.clone());
        self.draft = Draft::default();
        Ok(saved)
    }
}

/// HTTP implementation against the hosted store's `reports` table.
pub struct ReportsHttp {
    http: reqwest::Client,
    base: String,
    anon_key: String,
}

impl ReportsHttp {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base: config.service_url.clone(),
            anon_key: config.anon_key.clone(),
        }
    }
}

#[async_trait]
impl ReportsApi for ReportsHttp {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Report>, AppError> {
        let filter = format!("eq.{user_id}");
        let resp = self
            .http
            .get(format!("{}/rest/v1/reports", self.base))
            .headers(service_headers(&self.anon_key))
            .query(&[
                ("select", "*"),
                ("user_id", filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;

        Ok(ok_or_reject(resp).await?.json().await?)
    }

    async fn insert_returning(&self, report: NewReport) -> Result<Report, AppError> {
        let resp = self
            .http
            .post(format!("{}/rest/v1/reports", self.base))
            .headers(service_headers(&self.anon_key))
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&[report])
            .send()
            .await?;

        let mut rows: Vec<Report> = ok_or_reject(resp).await?.json().await?;
        if rows.is_empty() {
            return Err(AppError::RemoteRejected(
                "insert returned no record".to_string(),
            ));
        }
        Ok(rows.remove(0))
    }
}
