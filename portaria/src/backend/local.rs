use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use portaria_core::error::AuthorizationError;
use portaria_core::feed::{ChangeFeed, ChangeSubscription};
use portaria_core::repository::{GrantRepository, NewGrant};
use portaria_core::settings::backend::{BackendKind, BackendSettings};
use portaria_core::settings::feed::FeedSettings;
use portaria_types::{
    ChangeEvent, ChangeKind, ExpandedGrant, Grant, IdentityId, Module, ModuleId, Permission,
    PermissionId,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::data::{BackendData, DataFile};

/// Grant relation, catalogs and change feed in one process.
///
/// With a data file every mutation is written to disk before it becomes
/// visible; a failed write leaves the in-memory state untouched.
pub struct LocalBackend {
    data: RwLock<BackendData>,
    data_file: Option<PathBuf>,
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<ChangeEvent>>>,
    buffer_size: usize,
}

impl LocalBackend {
    pub fn in_memory(data: BackendData, feed: &FeedSettings) -> Self {
        Self {
            data: RwLock::new(data),
            data_file: None,
            subscribers: Mutex::new(HashMap::new()),
            buffer_size: feed.buffer_size.max(1),
        }
    }

    /// Load from a YAML data file and persist every mutation back into it.
    pub async fn from_yaml(path: impl Into<PathBuf>, feed: &FeedSettings) -> Result<Self> {
        let path = path.into();
        let data = DataFile::load(&path).await?;
        info!(
            "Loaded grant data from {}: {} modules, {} permissions, {} grants",
            path.display(),
            data.modules.len(),
            data.permissions.len(),
            data.grants.len()
        );

        let mut backend = Self::in_memory(data, feed);
        backend.data_file = Some(path);
        Ok(backend)
    }

    /// The memory kind seeds itself from the data file but never writes to it.
    pub async fn from_settings(backend: &BackendSettings, feed: &FeedSettings) -> Result<Self> {
        match backend.kind {
            BackendKind::Yaml => Self::from_yaml(&backend.data_file, feed).await,
            BackendKind::Memory => {
                let data = DataFile::load(Path::new(&backend.data_file)).await?;
                Ok(Self::in_memory(data, feed))
            }
        }
    }

    /// Number of live subscriptions held on the feed side.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|_, sender| !sender.is_closed());
        subscribers.len()
    }

    pub async fn module_by_name(&self, name: &str) -> Option<Module> {
        let data = self.data.read().await;
        data.modules.iter().find(|m| m.name == name).cloned()
    }

    pub async fn permission_by_name(&self, name: &str) -> Option<Permission> {
        let data = self.data.read().await;
        data.permissions.iter().find(|p| p.name == name).cloned()
    }

    /// Copy of all stored rows.
    pub async fn data(&self) -> BackendData {
        self.data.read().await.clone()
    }

    async fn persist(&self, next: &BackendData) -> Result<(), AuthorizationError> {
        match &self.data_file {
            Some(path) => DataFile::save(next, path)
                .await
                .map_err(|e| AuthorizationError::persistence(format!("{e:#}"))),
            None => Ok(()),
        }
    }

    fn publish(&self, kind: ChangeKind) {
        let event = ChangeEvent::new(kind);
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|id, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Subscription {} already has a reload pending, dropping event", id);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Pruning closed subscription {}", id);
                false
            }
        });
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, mpsc::Sender<ChangeEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("data_file", &self.data_file)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GrantRepository for LocalBackend {
    async fn grants_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Vec<ExpandedGrant>, AuthorizationError> {
        let data = self.data.read().await;
        let modules: HashMap<&ModuleId, &Module> =
            data.modules.iter().map(|m| (&m.id, m)).collect();
        let permissions: HashMap<&PermissionId, &Permission> =
            data.permissions.iter().map(|p| (&p.id, p)).collect();

        let grants = data
            .grants
            .iter()
            .filter(|grant| &grant.identity_id == identity_id)
            .filter_map(|grant| {
                let module = modules.get(&grant.module_id)?;
                let permission = permissions.get(&grant.permission_id)?;
                Some(ExpandedGrant {
                    grant: grant.clone(),
                    module: (*module).clone(),
                    permission: (*permission).clone(),
                })
            })
            .collect();

        Ok(grants)
    }

    async fn list_modules(&self) -> Result<Vec<Module>, AuthorizationError> {
        Ok(self.data.read().await.modules.clone())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, AuthorizationError> {
        Ok(self.data.read().await.permissions.clone())
    }

    async fn insert_grant(&self, new_grant: NewGrant) -> Result<Grant, AuthorizationError> {
        let mut data = self.data.write().await;

        if !data.modules.iter().any(|m| m.id == new_grant.module_id) {
            return Err(AuthorizationError::persistence(format!(
                "grant references unknown module id '{}'",
                new_grant.module_id
            )));
        }
        if !data.permissions.iter().any(|p| p.id == new_grant.permission_id) {
            return Err(AuthorizationError::persistence(format!(
                "grant references unknown permission id '{}'",
                new_grant.permission_id
            )));
        }

        let grant = Grant {
            id: Uuid::new_v4(),
            identity_id: new_grant.identity_id,
            module_id: new_grant.module_id,
            permission_id: new_grant.permission_id,
            granted_by: new_grant.granted_by,
            created_at: Utc::now(),
        };

        let mut next = data.clone();
        next.grants.push(grant.clone());
        self.persist(&next).await?;
        *data = next;
        drop(data);

        self.publish(ChangeKind::Insert);
        Ok(grant)
    }

    async fn delete_grants(
        &self,
        identity_id: &IdentityId,
        module_id: &ModuleId,
        permission_id: &PermissionId,
    ) -> Result<usize, AuthorizationError> {
        let mut data = self.data.write().await;

        let mut next = data.clone();
        next.grants
            .retain(|grant| !grant.matches(identity_id, module_id, permission_id));
        let removed = data.grants.len() - next.grants.len();
        if removed == 0 {
            return Ok(0);
        }

        self.persist(&next).await?;
        *data = next;
        drop(data);

        self.publish(ChangeKind::Delete);
        Ok(removed)
    }
}

#[async_trait]
impl ChangeFeed for LocalBackend {
    async fn subscribe(&self) -> Result<ChangeSubscription, AuthorizationError> {
        let (sender, events) = mpsc::channel(self.buffer_size);
        let id = Uuid::new_v4();
        self.lock_subscribers().insert(id, sender);
        debug!("Opened grant change subscription {}", id);
        Ok(ChangeSubscription { id, events })
    }

    async fn unsubscribe(&self, id: Uuid) -> Result<(), AuthorizationError> {
        if self.lock_subscribers().remove(&id).is_some() {
            debug!("Closed grant change subscription {}", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> BackendData {
        BackendData {
            modules: vec![Module {
                id: "m-agenda".into(),
                name: "agenda".to_string(),
                display_name: "Agenda".to_string(),
                description: None,
            }],
            permissions: vec![Permission {
                id: "p-view".into(),
                name: "view".to_string(),
                display_name: "Visualizar".to_string(),
                description: None,
            }],
            grants: vec![],
        }
    }

    fn new_grant(identity: &str) -> NewGrant {
        NewGrant {
            identity_id: identity.into(),
            module_id: "m-agenda".into(),
            permission_id: "p-view".into(),
            granted_by: "root".into(),
        }
    }

    #[tokio::test]
    async fn test_insert_publishes_and_joins() {
        let backend = LocalBackend::in_memory(seed(), &FeedSettings::default());
        let mut subscription = backend.subscribe().await.unwrap();

        backend.insert_grant(new_grant("u2")).await.unwrap();

        let event = subscription.events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);

        let grants = backend.grants_for_identity(&"u2".into()).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].module.name, "agenda");
        assert_eq!(grants[0].permission.name, "view");
        assert!(backend
            .grants_for_identity(&"u1".into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_insert_with_unknown_module_fails() {
        let backend = LocalBackend::in_memory(seed(), &FeedSettings::default());
        let mut grant = new_grant("u2");
        grant.module_id = "m-missing".into();

        let result = backend.insert_grant(grant).await;
        assert!(matches!(result, Err(AuthorizationError::Persistence(_))));
        assert!(backend.data().await.grants.is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_rows_publishes_nothing() {
        let backend = LocalBackend::in_memory(seed(), &FeedSettings::default());
        let mut subscription = backend.subscribe().await.unwrap();

        let removed = backend
            .delete_grants(&"u1".into(), &"m-agenda".into(), &"p-view".into())
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(subscription.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_duplicates() {
        let backend = LocalBackend::in_memory(seed(), &FeedSettings::default());
        backend.insert_grant(new_grant("u2")).await.unwrap();
        backend.insert_grant(new_grant("u2")).await.unwrap();
        backend.insert_grant(new_grant("u3")).await.unwrap();

        let removed = backend
            .delete_grants(&"u2".into(), &"m-agenda".into(), &"p-view".into())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.data().await.grants.len(), 1);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_events_and_closed_subscribers_are_pruned() {
        let backend = LocalBackend::in_memory(seed(), &FeedSettings::with_buffer_size(1));
        let mut kept = backend.subscribe().await.unwrap();
        let dropped = backend.subscribe().await.unwrap();
        drop(dropped);
        assert_eq!(backend.subscriber_count(), 1);

        backend.insert_grant(new_grant("u2")).await.unwrap();
        backend.insert_grant(new_grant("u3")).await.unwrap();

        assert!(kept.events.recv().await.is_some());
        assert!(kept.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let backend = LocalBackend::in_memory(seed(), &FeedSettings::default());
        let subscription = backend.subscribe().await.unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        backend.unsubscribe(subscription.id).await.unwrap();
        backend.unsubscribe(subscription.id).await.unwrap();
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_yaml_round_trip_and_failed_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("grants.yaml");
        DataFile::save(&seed(), &path).await.unwrap();

        let backend = LocalBackend::from_yaml(&path, &FeedSettings::default())
            .await
            .unwrap();
        backend.insert_grant(new_grant("u2")).await.unwrap();

        let reloaded = DataFile::load(&path).await.unwrap();
        assert_eq!(reloaded.grants.len(), 1);
        assert_eq!(reloaded.grants[0].identity_id, IdentityId::from("u2"));

        // Writing into a directory that no longer exists must fail without
        // changing what the backend serves.
        let broken = LocalBackend::from_yaml(&path, &FeedSettings::default())
            .await
            .unwrap();
        drop(temp_dir);
        let result = broken.insert_grant(new_grant("u3")).await;
        assert!(matches!(result, Err(AuthorizationError::Persistence(_))));
        assert_eq!(broken.data().await.grants.len(), 1);
    }
}
