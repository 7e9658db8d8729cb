use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use portaria_core::error::AuthorizationError;
use portaria_core::repository::GrantRepository;
use portaria_core::settings::store::StoreSettings;
use portaria_types::Identity;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::snapshot::PermissionSnapshot;

/// Load progress of a permission store, observable through [`PermissionStore::watch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStatus {
    /// At least one load is in flight
    pub loading: bool,
    /// The first load of the session has completed, successfully or not
    pub settled: bool,
    /// Sequence number of the load whose snapshot is currently applied, 0 if none
    pub revision: u64,
}

struct AppliedSnapshot {
    revision: u64,
    snapshot: Arc<PermissionSnapshot>,
}

/// Holds the permission snapshot of one session identity and answers
/// membership queries against it.
///
/// Loads may overlap. Every load takes a sequence number when it starts and
/// its result is only applied if no later load has been applied already, so
/// a slow, older load can never overwrite newer data.
pub struct PermissionStore {
    identity: Option<Identity>,
    repository: Arc<dyn GrantRepository>,
    load_timeout: Duration,
    applied: RwLock<AppliedSnapshot>,
    next_sequence: AtomicU64,
    in_flight: AtomicUsize,
    status: watch::Sender<StoreStatus>,
}

impl PermissionStore {
    pub fn new(
        identity: Option<Identity>,
        repository: Arc<dyn GrantRepository>,
        settings: &StoreSettings,
    ) -> Self {
        let (status, _) = watch::channel(StoreStatus::default());
        Self {
            identity,
            repository,
            load_timeout: settings.load_timeout(),
            applied: RwLock::new(AppliedSnapshot {
                revision: 0,
                snapshot: Arc::new(PermissionSnapshot::empty()),
            }),
            next_sequence: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            status,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Fetch grants and catalogs and replace the snapshot in one step.
    ///
    /// Failures are logged and leave the previous snapshot in place. Returns
    /// the sequence number assigned to this load.
    pub async fn load(&self) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut in_flight = self.begin_load();

        let outcome = match &self.identity {
            None => Ok(PermissionSnapshot::empty()),
            Some(identity) => {
                match tokio::time::timeout(self.load_timeout, self.fetch(identity)).await {
                    Ok(result) => result,
                    Err(_) => Err(AuthorizationError::persistence(format!(
                        "permission load timed out after {:?}",
                        self.load_timeout
                    ))),
                }
            }
        };

        match outcome {
            Ok(snapshot) => self.apply(sequence, snapshot),
            Err(e) => error!(
                "Failed to load permissions for {} (load {}): {}. Keeping last known snapshot",
                self.identity_label(),
                sequence,
                e
            ),
        }

        in_flight.settled = true;
        sequence
    }

    /// Trigger an immediate reload.
    pub async fn refresh_permissions(&self) -> u64 {
        info!("Refreshing permissions for {}", self.identity_label());
        self.load().await
    }

    /// True iff the snapshot holds `permission_name` within `module_name`.
    /// Never waits for a load; no identity or no data means no access.
    pub fn has_permission(&self, module_name: &str, permission_name: &str) -> bool {
        if self.identity.is_none() {
            return false;
        }
        self.snapshot().has_permission(module_name, permission_name)
    }

    pub fn module_permissions(&self, module_name: &str) -> BTreeSet<String> {
        if self.identity.is_none() {
            return BTreeSet::new();
        }
        self.snapshot().module_permissions(module_name)
    }

    /// The currently applied snapshot. Hold on to the `Arc` for several
    /// reads that must come from the same load.
    pub fn snapshot(&self) -> Arc<PermissionSnapshot> {
        self.applied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    pub fn loading(&self) -> bool {
        self.status.borrow().loading
    }

    pub fn status(&self) -> StoreStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<StoreStatus> {
        self.status.subscribe()
    }

    /// Wait until the first load of this store has completed.
    pub async fn wait_until_settled(&self) {
        let mut status = self.watch_status();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = status.wait_for(|status| status.settled).await;
    }

    /// Mark the first load as settled without waiting for it, keeping the
    /// current snapshot.
    pub fn settle(&self) {
        self.status.send_if_modified(|status| {
            let changed = !status.settled;
            status.settled = true;
            changed
        });
    }

    async fn fetch(&self, identity: &Identity) -> Result<PermissionSnapshot, AuthorizationError> {
        let (grants, modules, permissions) = tokio::try_join!(
            self.repository.grants_for_identity(&identity.id),
            self.repository.list_modules(),
            self.repository.list_permissions(),
        )?;
        Ok(PermissionSnapshot::build(grants, modules, permissions))
    }

    fn apply(&self, sequence: u64, snapshot: PermissionSnapshot) {
        let mut applied = self.applied.write().unwrap_or_else(PoisonError::into_inner);
        if sequence <= applied.revision {
            debug!(
                "Discarding superseded permission load {} for {}, load {} already applied",
                sequence,
                self.identity_label(),
                applied.revision
            );
            return;
        }

        debug!(
            "Applying permission load {} for {}: {} grants, {} modules, {} permissions",
            sequence,
            self.identity_label(),
            snapshot.grants().len(),
            snapshot.modules().len(),
            snapshot.permissions().len()
        );
        applied.revision = sequence;
        applied.snapshot = Arc::new(snapshot);
    }

    fn revision(&self) -> u64 {
        self.applied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    fn begin_load(&self) -> InFlightLoad<'_> {
        self.status.send_modify(|status| {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            status.loading = true;
        });
        InFlightLoad {
            store: self,
            settled: false,
        }
    }

    fn identity_label(&self) -> &str {
        self.identity
            .as_ref()
            .map(|identity| identity.id.as_str())
            .unwrap_or("<anonymous>")
    }
}

impl std::fmt::Debug for PermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionStore")
            .field("identity", &self.identity)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Tracks one running load. Dropping it without `settled` (for example when
/// the loading task is aborted) still clears the in-flight count.
struct InFlightLoad<'a> {
    store: &'a PermissionStore,
    settled: bool,
}

impl Drop for InFlightLoad<'_> {
    fn drop(&mut self) {
        let store = self.store;
        let settled = self.settled;
        let revision = store.revision();
        store.status.send_modify(|status| {
            let remaining = store.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            status.loading = remaining > 0;
            status.settled |= settled;
            status.revision = status.revision.max(revision);
        });
    }
}
