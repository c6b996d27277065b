//! # Auth collaborator
//!
//! Client for the hosted authentication service. The store talks GoTrue-style
//! endpoints under `/auth/v1`:
//!
//! - `POST /signup` creates an identity and sends the confirmation mail
//! - `POST /token?grant_type=password` exchanges credentials for a session
//! - `GET /user` resolves the identity behind a persisted access token
//! - `POST /logout` invalidates the session server side
//!
//! State-change notifications are fanned out over registered channels, the
//! same shape the service's own client library uses for its listener
//! callbacks. All deadline handling lives with the caller, this module only
//! speaks the wire protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::rest::{ok_or_reject, service_headers};
use crate::session::Session;

/// A collaborator-driven session change, delivered in emission order.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    /// The full replacement value. `None` means signed out.
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// The identity created by a sign-up, pending email confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: Uuid,
    pub email: String,
    pub confirmation_sent: bool,
}

/// Handle for a state-change listener registration.
///
/// `unsubscribe` is idempotent and dropping the handle unsubscribes too, so
/// the registration is released exactly once on every exit path.
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(active: Arc<AtomicBool>) -> Self {
        Self { active }
    }

    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// The auth collaborator's contract as the session store sees it.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Restore the session persisted by the collaborator, if any.
    async fn current_session(&self) -> Result<Option<Session>, AppError>;

    /// Success does not sign the user in, confirmation is the service's
    /// policy.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Credentials, AppError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// Register a listener for collaborator-driven session changes.
    fn on_auth_state_change(&self, listener: UnboundedSender<AuthEvent>) -> Subscription;
}

struct Listener {
    sender: UnboundedSender<AuthEvent>,
    active: Arc<AtomicBool>,
}

/// HTTP implementation against the hosted service.
pub struct AuthHttp {
    http: reqwest::Client,
    base: String,
    anon_key: String,
    /// Access token of the current session, if one was established in this
    /// process.
    token: Mutex<Option<String>>,
    listeners: Mutex<Vec<Listener>>,
}

impl AuthHttp {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base: config.service_url.clone(),
            anon_key: config.anon_key.clone(),
            token: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        let event = AuthEvent { kind, session };
        self.listeners.lock().unwrap().retain(|listener| {
            listener.active.load(Ordering::SeqCst) && listener.sender.send(event.clone()).is_ok()
        });
    }
}

#[async_trait]
impl AuthApi for AuthHttp {
    async fn current_session(&self) -> Result<Option<Session>, AppError> {
        let token = self.token.lock().unwrap().clone();
        let Some(token) = token else {
            return Ok(None);
        };

        let resp = self
            .http
            .get(format!("{}/auth/v1/user", self.base))
            .headers(service_headers(&self.anon_key))
            .bearer_auth(&token)
            .send()
            .await?;

        let user: WireUser = ok_or_reject(resp).await?.json().await?;
        Ok(Some(user.into_session()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Credentials, AppError> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/signup", self.base))
            .headers(service_headers(&self.anon_key))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let user: WireUser = ok_or_reject(resp).await?.json().await?;
        Ok(Credentials {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| email.to_string()),
            confirmation_sent: user.confirmation_sent_at.is_some(),
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.base))
            .headers(service_headers(&self.anon_key))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let grant: TokenResponse = ok_or_reject(resp).await?.json().await?;
        let session = grant.user.into_session();

        *self.token.lock().unwrap() = Some(grant.access_token);
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        let token = self.token.lock().unwrap().take();
        self.emit(AuthEventKind::SignedOut, None);

        let Some(token) = token else {
            return Ok(());
        };

        let resp = self
            .http
            .post(format!("{}/auth/v1/logout", self.base))
            .headers(service_headers(&self.anon_key))
            .bearer_auth(&token)
            .send()
            .await?;

        ok_or_reject(resp).await?;
        Ok(())
    }

    fn on_auth_state_change(&self, listener: UnboundedSender<AuthEvent>) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        self.listeners.lock().unwrap().push(Listener {
            sender: listener,
            active: Arc::clone(&active),
        });
        Subscription::new(active)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: WireUser,
}

#[derive(Deserialize)]
struct WireUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    confirmation_sent_at: Option<DateTime<Utc>>,
}

impl WireUser {
    fn into_session(self) -> Session {
        Session {
            user_id: self.id,
            email: self.email.unwrap_or_default(),
        }
    }
}
