use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

use crate::auth::AuthHttp;
use crate::config::Config;
use crate::geocode::{GeocodeApi, GeocodeHttp, LocationSearch};
use crate::profile::{ProfileManager, ProfilesApi, ProfilesHttp};
use crate::reports::{ReportsApi, ReportsHttp, SubmissionFlow};
use crate::session::SessionStore;
use crate::storage::{PROFILE_BUCKET, StorageApi, StorageHttp};

/// How long the first view gets before a stuck startup is called out.
pub const STARTUP_WATCHDOG: Duration = Duration::from_secs(5);

/// Online/offline flag fed by the host shell, read by the submission flow.
pub struct Connectivity {
    flag: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new() -> Self {
        Self {
            flag: watch::channel(true).0,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.flag.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.flag.subscribe().borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

/// Raises a visible warning when the first view never signals readiness.
/// Points at a stuck initialization, does not diagnose it.
pub struct StartupWatchdog {
    ready: Mutex<Option<oneshot::Sender<()>>>,
    stuck: watch::Receiver<bool>,
    timer: JoinHandle<()>,
}

impl StartupWatchdog {
    pub fn arm(limit: Duration) -> Self {
        let (ready, mounted) = oneshot::channel();
        let (stuck_flag, stuck) = watch::channel(false);

        let timer = tokio::spawn(async move {
            if timeout(limit, mounted).await.is_err() {
                warn!(
                    "startup has not finished after {limit:?}, \
                     authentication or first render may be stuck"
                );
                stuck_flag.send_replace(true);
            }
        });

        Self {
            ready: Mutex::new(Some(ready)),
            stuck,
            timer,
        }
    }

    /// Signal that the first view mounted. Later calls are no-ops.
    pub fn mark_ready(&self) {
        if let Some(ready) = self.ready.lock().unwrap().take() {
            let _ = ready.send(());
        }
    }

    pub fn is_stuck(&self) -> bool {
        *self.stuck.borrow()
    }
}

impl Drop for StartupWatchdog {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Everything the host shell needs, wired the same way at every startup.
pub struct App {
    pub config: Config,
    pub session: SessionStore,
    pub connectivity: Connectivity,
    pub watchdog: StartupWatchdog,
    reports: Arc<dyn ReportsApi>,
    search: Arc<LocationSearch>,
    profiles: Arc<dyn ProfilesApi>,
    storage: Arc<dyn StorageApi>,
}

impl App {
    /// Load configuration, build the collaborator clients and start the
    /// session store. Returns once the store has left `Initializing`.
    pub async fn start() -> Arc<Self> {
        let _ = fmt().with_env_filter(EnvFilter::from_default_env()).try_init();

        info!("Initializing state...");
        let config = Config::load();

        let http = reqwest::Client::builder()
            .user_agent(concat!("trash-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("HTTP client construction failed");

        let auth = Arc::new(AuthHttp::new(http.clone(), &config));
        let session = SessionStore::start(auth).await;

        let reports: Arc<dyn ReportsApi> = Arc::new(ReportsHttp::new(http.clone(), &config));
        let geocode: Arc<dyn GeocodeApi> = Arc::new(GeocodeHttp::new(http.clone(), &config));
        let search = Arc::new(LocationSearch::new(geocode));
        let profiles: Arc<dyn ProfilesApi> = Arc::new(ProfilesHttp::new(http.clone(), &config));
        let storage: Arc<dyn StorageApi> =
            Arc::new(StorageHttp::new(http, &config, PROFILE_BUCKET));

        info!("State ready");

        Arc::new(Self {
            config,
            session,
            connectivity: Connectivity::new(),
            watchdog: StartupWatchdog::arm(STARTUP_WATCHDOG),
            reports,
            search,
            profiles,
            storage,
        })
    }

    /// A fresh submission form for the signed-in user.
    pub fn submission_flow(&self, user_id: Uuid) -> SubmissionFlow {
        SubmissionFlow::new(Arc::clone(&self.reports), user_id, self.connectivity.watch())
    }

    pub fn location_search(&self) -> Arc<LocationSearch> {
        Arc::clone(&self.search)
    }

    pub fn profile_manager(&self) -> ProfileManager {
        ProfileManager::new(Arc::clone(&self.profiles), Arc::clone(&self.storage))
    }

    /// Release the session store's collaborator subscription and stop the
    /// watchdog.
    pub fn shutdown(&self) {
        self.session.shutdown();
        self.watchdog.mark_ready();
    }
}
