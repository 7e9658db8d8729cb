use std::sync::{Arc, Mutex, PoisonError};

use portaria_core::feed::ChangeFeed;
use portaria_core::repository::GrantRepository;
use portaria_core::settings::store::StoreSettings;
use portaria_types::Identity;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::feed::ChangeFeedSubscriber;
use super::guard::AccessGuard;
use super::identity::{CurrentIdentity, SignIn};
use super::store::PermissionStore;
use crate::stop_flag::StopFlag;

/// Authorization state of one signed-in identity: its permission store and
/// the change feed subscription keeping it current.
pub struct AuthorizationSession {
    identity: Identity,
    store: Arc<PermissionStore>,
    subscriber: Option<ChangeFeedSubscriber>,
    initial_load: Mutex<Option<JoinHandle<()>>>,
}

impl AuthorizationSession {
    /// Subscribe to grant changes and start the initial load in the
    /// background. Guards report `Loading` until that load settles.
    ///
    /// The subscription is opened before the first load so no change made
    /// in between goes unnoticed. If it cannot be opened the session still
    /// works, without live updates.
    pub async fn establish(
        identity: Identity,
        repository: Arc<dyn GrantRepository>,
        feed: Arc<dyn ChangeFeed>,
        settings: &StoreSettings,
    ) -> Arc<Self> {
        let store = Arc::new(PermissionStore::new(
            Some(identity.clone()),
            repository,
            settings,
        ));

        let subscriber = match ChangeFeedSubscriber::start(feed, store.clone()).await {
            Ok(subscriber) => Some(subscriber),
            Err(e) => {
                warn!(
                    "Live permission updates disabled for {}: {}",
                    identity.id, e
                );
                None
            }
        };

        let initial_load = {
            let store = store.clone();
            tokio::spawn(async move {
                store.load().await;
            })
        };

        info!(
            "Authorization session established for {} (role '{}')",
            identity.id, identity.role
        );

        Arc::new(Self {
            identity,
            store,
            subscriber,
            initial_load: Mutex::new(Some(initial_load)),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> Arc<PermissionStore> {
        self.store.clone()
    }

    pub fn has_live_updates(&self) -> bool {
        self.subscriber
            .as_ref()
            .is_some_and(ChangeFeedSubscriber::is_active)
    }

    pub fn guard(&self, module: impl Into<String>, permission: impl Into<String>) -> AccessGuard {
        AccessGuard::new(
            Some(self.identity.clone()),
            self.store.clone(),
            module,
            permission,
        )
    }

    /// Release the subscription and stop a still running initial load.
    /// Guards from an ended session resolve against whatever was loaded,
    /// nothing if the first load never finished. Safe to call more than once.
    pub async fn end(&self) {
        let initial_load = self
            .initial_load
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(initial_load) = initial_load else {
            return;
        };
        initial_load.abort();
        // Release guards still waiting for the first load.
        self.store.settle();

        if let Some(subscriber) = &self.subscriber {
            subscriber.teardown().await;
        }
        info!("Authorization session ended for {}", self.identity.id);
    }
}

impl std::fmt::Debug for AuthorizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationSession")
            .field("identity", &self.identity)
            .field("store", &self.store)
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

/// Follows the signed-in identity and keeps exactly one authorization
/// session for it.
pub struct SessionManager {
    repository: Arc<dyn GrantRepository>,
    feed: Arc<dyn ChangeFeed>,
    identity: CurrentIdentity,
    settings: StoreSettings,
    current: tokio::sync::Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    sign_in: Uuid,
    session: Arc<AuthorizationSession>,
}

impl SessionManager {
    pub fn new(
        repository: Arc<dyn GrantRepository>,
        feed: Arc<dyn ChangeFeed>,
        identity: CurrentIdentity,
        settings: StoreSettings,
    ) -> Self {
        Self {
            repository,
            feed,
            identity,
            settings,
            current: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn current(&self) -> Option<Arc<AuthorizationSession>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Bring the active session in line with the signed-in identity: end it
    /// on sign-out, replace it on every new sign-in, including the same
    /// identity signing in again.
    pub async fn sync(&self) -> Option<Arc<AuthorizationSession>> {
        let wanted = self.identity.current_sign_in();
        let mut current = self.current.lock().await;

        let unchanged = match (current.as_ref(), wanted.as_ref()) {
            (Some(active), Some(sign_in)) => active.sign_in == sign_in.id,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return current.as_ref().map(|active| active.session.clone());
        }

        if let Some(previous) = current.take() {
            previous.session.end().await;
        }

        if let Some(SignIn { id, identity }) = wanted {
            let session = AuthorizationSession::establish(
                identity,
                self.repository.clone(),
                self.feed.clone(),
                &self.settings,
            )
            .await;
            *current = Some(ActiveSession {
                sign_in: id,
                session,
            });
        }

        current.as_ref().map(|active| active.session.clone())
    }

    /// React to sign-in/sign-out until the stop flag is raised, then end the
    /// active session.
    pub async fn run(&self, stop_flag: StopFlag) {
        let mut events = self.identity.subscribe();
        self.sync().await;

        while !stop_flag.is_stopped() {
            tokio::select! {
                changed = events.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync().await;
                }
                _ = stop_flag.wait() => break,
            }
        }

        self.shutdown().await;
    }

    pub async fn shutdown(&self) {
        if let Some(active) = self.current.lock().await.take() {
            active.session.end().await;
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
