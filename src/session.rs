//! # Session store
//!
//! Single source of truth for who is signed in, alive for the whole process.
//!
//! ## Lifecycle
//!
//! - Starts in `Initializing` while the one-time restore query is in flight
//! - Restore failure falls back to `Anonymous`, the store never stays stuck
//! - Afterwards the collaborator's state-change notifications drive every
//!   `Authenticated` / `Anonymous` transition, each one replacing the session
//!   value wholesale in arrival order
//! - Teardown releases the collaborator subscription exactly once, `Drop`
//!   covers the paths that never call `shutdown`
//!
//! ## Reads
//!
//! Consumers hold a `watch::Receiver` or call [`SessionStore::current_session`]
//! for a synchronous snapshot. Only the store writes the value.
//!
//! ## Remote calls
//!
//! Sign-up and sign-in race the collaborator against a fixed deadline, first
//! settled wins and the loser is abandoned. Sign-out clears the local session
//! immediately and lets the remote invalidation finish in the background, its
//! error only reaches the log because the user-facing navigation has already
//! moved on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{AuthApi, AuthEvent, Credentials, Subscription};
use crate::deadline::with_deadline;
use crate::error::AppError;

pub const SIGN_UP_DEADLINE: Duration = Duration::from_secs(15);
pub const SIGN_IN_DEADLINE: Duration = Duration::from_secs(10);

/// The currently authenticated identity as known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The startup restore has not resolved yet.
    Initializing,
    Authenticated(Session),
    Anonymous,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Initializing)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

/// What a protected view should do for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    RedirectToLogin,
    /// Still restoring, keep the loading shell up.
    Wait,
}

/// Navigation check for views that require a signed-in user.
pub fn route_guard(state: &SessionState) -> Gate {
    match state {
        SessionState::Initializing => Gate::Wait,
        SessionState::Authenticated(_) => Gate::Allow,
        SessionState::Anonymous => Gate::RedirectToLogin,
    }
}

pub struct SessionStore {
    auth: Arc<dyn AuthApi>,
    state: watch::Sender<SessionState>,
    subscription: Subscription,
    consumer: JoinHandle<()>,
    sign_up_deadline: Duration,
    sign_in_deadline: Duration,
}

impl SessionStore {
    /// Subscribe to collaborator notifications, then restore any persisted
    /// session. Always resolves out of `Initializing`.
    pub async fn start(auth: Arc<dyn AuthApi>) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);

        let (events, inbox) = mpsc::unbounded_channel();
        let subscription = auth.on_auth_state_change(events);
        let consumer = tokio::spawn(consume_events(inbox, state.clone()));

        match auth.current_session().await {
            Ok(Some(session)) => {
                info!(user = %session.user_id, "restored persisted session");
                state.send_replace(SessionState::Authenticated(session));
            }
            Ok(None) => {
                state.send_replace(SessionState::Anonymous);
            }
            Err(err) => {
                warn!("session restore failed, treating as signed out: {err}");
                state.send_replace(SessionState::Anonymous);
            }
        }

        Self {
            auth,
            state,
            subscription,
            consumer,
            sign_up_deadline: SIGN_UP_DEADLINE,
            sign_in_deadline: SIGN_IN_DEADLINE,
        }
    }

    /// Latest known state, without waiting.
    pub fn current_session(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Read handle for views that react to changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Success does not transition the session, the user still has to confirm
    /// their email and sign in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Credentials, AppError> {
        let auth = Arc::clone(&self.auth);
        let (email, password) = (email.to_owned(), password.to_owned());

        with_deadline("sign up", self.sign_up_deadline, async move {
            auth.sign_up(&email, &password).await
        })
        .await
    }

    /// On success the current session is replaced synchronously before the
    /// call returns.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let auth = Arc::clone(&self.auth);
        let (email, password) = (email.to_owned(), password.to_owned());

        let session = with_deadline("sign in", self.sign_in_deadline, async move {
            auth.sign_in_with_password(&email, &password).await
        })
        .await?;

        self.state
            .send_replace(SessionState::Authenticated(session.clone()));
        Ok(session)
    }

    /// Clears the local session immediately. The remote invalidation keeps
    /// running in the background and a failure there only reaches the log.
    pub fn sign_out(&self) {
        self.state.send_replace(SessionState::Anonymous);

        let auth = Arc::clone(&self.auth);
        tokio::spawn(async move {
            if let Err(err) = auth.sign_out().await {
                warn!("remote sign-out failed after local sign-out: {err}");
            }
        });
    }

    /// Stop consuming notifications and release the subscription. Safe to
    /// call more than once.
    pub fn shutdown(&self) {
        self.subscription.unsubscribe();
        self.consumer.abort();
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Applies notifications in arrival order, each replacing the session value
/// wholesale. Last write wins.
async fn consume_events(
    mut inbox: mpsc::UnboundedReceiver<AuthEvent>,
    state: watch::Sender<SessionState>,
) {
    while let Some(event) = inbox.recv().await {
        debug!(kind = ?event.kind, "auth state change");
        let next = match event.session {
            Some(session) => SessionState::Authenticated(session),
            None => SessionState::Anonymous,
        };
        state.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::auth::AuthEventKind;

    fn session(n: u128) -> Session {
        Session {
            user_id: Uuid::from_u128(n),
            email: format!("user{n}@example.com"),
        }
    }

    #[derive(Default)]
    struct FakeAuth {
        restore: Mutex<Option<Result<Option<Session>, AppError>>>,
        sign_in: Mutex<Option<Result<Session, AppError>>>,
        sign_in_delay: Duration,
        sign_up: Mutex<Option<Result<Credentials, AppError>>>,
        sign_up_delay: Duration,
        sign_out_result: Mutex<Option<Result<(), AppError>>>,
        sign_out_calls: AtomicUsize,
        listener: Mutex<Option<UnboundedSender<AuthEvent>>>,
        subscribed: Mutex<Option<Arc<AtomicBool>>>,
    }

    impl FakeAuth {
        fn notify(&self, session: Option<Session>) {
            let kind = match session {
                Some(_) => AuthEventKind::SignedIn,
                None => AuthEventKind::SignedOut,
            };
            self.listener
                .lock()
                .unwrap()
                .as_ref()
                .unwrap()
                .send(AuthEvent { kind, session })
                .unwrap();
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn current_session(&self) -> Result<Option<Session>, AppError> {
            self.restore.lock().unwrap().take().unwrap_or(Ok(None))
        }

        async fn sign_up(&self, _email: &str, _password: &str) -> Result<Credentials, AppError> {
            sleep(self.sign_up_delay).await;
            self.sign_up
                .lock()
                .unwrap()
                .take()
                .expect("unexpected sign_up call")
        }

        async fn sign_in_with_password(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<Session, AppError> {
            sleep(self.sign_in_delay).await;
            self.sign_in
                .lock()
                .unwrap()
                .take()
                .expect("unexpected sign_in call")
        }

        async fn sign_out(&self) -> Result<(), AppError> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            self.sign_out_result.lock().unwrap().take().unwrap_or(Ok(()))
        }

        fn on_auth_state_change(&self, listener: UnboundedSender<AuthEvent>) -> Subscription {
            let active = Arc::new(AtomicBool::new(true));
            *self.listener.lock().unwrap() = Some(listener);
            *self.subscribed.lock().unwrap() = Some(Arc::clone(&active));
            Subscription::new(active)
        }
    }

    async fn wait_for(store: &SessionStore, expected: SessionState) {
        let mut rx = store.subscribe();
        timeout(Duration::from_secs(1), rx.wait_for(|state| *state == expected))
            .await
            .expect("state never reached")
            .unwrap();
    }

    #[tokio::test]
    async fn restore_success_authenticates() {
        let auth = Arc::new(FakeAuth::default());
        *auth.restore.lock().unwrap() = Some(Ok(Some(session(1))));

        let store = SessionStore::start(auth).await;

        assert_eq!(
            store.current_session(),
            SessionState::Authenticated(session(1))
        );
    }

    #[tokio::test]
    async fn restore_failure_falls_back_to_anonymous() {
        let auth = Arc::new(FakeAuth::default());
        *auth.restore.lock().unwrap() =
            Some(Err(AppError::RemoteRejected("boom".to_string())));

        let store = SessionStore::start(auth).await;

        assert_eq!(store.current_session(), SessionState::Anonymous);
        assert!(!store.current_session().is_loading());
    }

    #[tokio::test]
    async fn notifications_apply_in_order_last_wins() {
        let auth = Arc::new(FakeAuth::default());
        let store = SessionStore::start(auth.clone()).await;

        for n in 1..=20 {
            auth.notify(Some(session(n)));
        }
        auth.notify(None);
        auth.notify(Some(session(42)));

        wait_for(&store, SessionState::Authenticated(session(42))).await;
    }

    #[tokio::test]
    async fn sign_in_replaces_session_synchronously() {
        let auth = Arc::new(FakeAuth::default());
        *auth.sign_in.lock().unwrap() = Some(Ok(session(7)));
        let store = SessionStore::start(auth.clone()).await;

        let signed_in = store.sign_in("user7@example.com", "pw").await.unwrap();

        assert_eq!(signed_in, session(7));
        assert_eq!(
            store.current_session(),
            SessionState::Authenticated(session(7))
        );
        assert_eq!(route_guard(&store.current_session()), Gate::Allow);
    }

    #[tokio::test]
    async fn slow_sign_in_times_out_and_leaves_state_alone() {
        let auth = Arc::new(FakeAuth {
            sign_in_delay: Duration::from_millis(200),
            ..FakeAuth::default()
        });
        *auth.sign_in.lock().unwrap() = Some(Ok(session(7)));
        let mut store = SessionStore::start(auth.clone()).await;
        store.sign_in_deadline = Duration::from_millis(20);

        let result = store.sign_in("user7@example.com", "pw").await;

        assert!(matches!(result, Err(AppError::Timeout("sign in"))));
        assert_eq!(store.current_session(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn sign_up_does_not_transition_session() {
        let auth = Arc::new(FakeAuth::default());
        *auth.sign_up.lock().unwrap() = Some(Ok(Credentials {
            user_id: Uuid::from_u128(9),
            email: "new@example.com".to_string(),
            confirmation_sent: true,
        }));
        let store = SessionStore::start(auth.clone()).await;

        let creds = store.sign_up("new@example.com", "pw").await.unwrap();

        assert!(creds.confirmation_sent);
        assert_eq!(store.current_session(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn slow_sign_up_times_out() {
        let auth = Arc::new(FakeAuth {
            sign_up_delay: Duration::from_millis(200),
            ..FakeAuth::default()
        });
        *auth.sign_up.lock().unwrap() = Some(Err(AppError::RemoteRejected("late".to_string())));
        let mut store = SessionStore::start(auth.clone()).await;
        store.sign_up_deadline = Duration::from_millis(20);

        let result = store.sign_up("new@example.com", "pw").await;

        assert!(matches!(result, Err(AppError::Timeout("sign up"))));
    }

    #[tokio::test]
    async fn sign_out_clears_locally_even_when_remote_fails() {
        let auth = Arc::new(FakeAuth::default());
        *auth.sign_in.lock().unwrap() = Some(Ok(session(7)));
        *auth.sign_out_result.lock().unwrap() =
            Some(Err(AppError::RemoteRejected("still fails".to_string())));
        let store = SessionStore::start(auth.clone()).await;
        store.sign_in("user7@example.com", "pw").await.unwrap();

        store.sign_out();

        assert_eq!(store.current_session(), SessionState::Anonymous);
        assert_eq!(
            route_guard(&store.current_session()),
            Gate::RedirectToLogin
        );

        timeout(Duration::from_secs(1), async {
            while auth.sign_out_calls.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("remote sign-out never attempted");
    }

    #[tokio::test]
    async fn shutdown_releases_subscription_once() {
        let auth = Arc::new(FakeAuth::default());
        let store = SessionStore::start(auth.clone()).await;
        let active = auth.subscribed.lock().unwrap().clone().unwrap();
        assert!(active.load(Ordering::SeqCst));

        store.shutdown();
        assert!(!active.load(Ordering::SeqCst));

        drop(store);
        assert!(!active.load(Ordering::SeqCst));
    }

    #[test]
    fn route_guard_waits_while_initializing() {
        assert_eq!(route_guard(&SessionState::Initializing), Gate::Wait);
    }
}
