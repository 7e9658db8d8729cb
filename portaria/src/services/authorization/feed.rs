use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use portaria_core::error::AuthorizationError;
use portaria_core::feed::{ChangeFeed, ChangeSubscription};
use portaria_types::ChangeEvent;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::PermissionStore;

/// Keeps one change feed subscription open for a permission store and
/// reloads the store on every event.
///
/// Events are not inspected: any insert, update or delete on the grant
/// relation invalidates the whole snapshot.
pub struct ChangeFeedSubscriber {
    feed: Arc<dyn ChangeFeed>,
    subscription_id: Uuid,
    task: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

impl ChangeFeedSubscriber {
    /// Open the subscription and start reacting to events.
    pub async fn start(
        feed: Arc<dyn ChangeFeed>,
        store: Arc<PermissionStore>,
    ) -> Result<Self, AuthorizationError> {
        let ChangeSubscription { id, events } = feed.subscribe().await?;
        info!("Subscribed to grant changes with subscription {}", id);

        let task = tokio::spawn(reload_on_change(id, events, store));

        Ok(Self {
            feed,
            subscription_id: id,
            task: Mutex::new(Some(task)),
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn subscription_id(&self) -> Uuid {
        self.subscription_id
    }

    pub fn is_active(&self) -> bool {
        !self.torn_down.load(Ordering::SeqCst)
    }

    /// Stop reacting to events and release the subscription. Only the first
    /// call does anything.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            debug!(
                "Subscription {} already torn down, ignoring",
                self.subscription_id
            );
            return;
        }

        if let Some(task) = self.take_task() {
            task.abort();
        }

        match self.feed.unsubscribe(self.subscription_id).await {
            Ok(()) => info!("Released grant change subscription {}", self.subscription_id),
            Err(e) => warn!(
                "Failed to release grant change subscription {}: {}",
                self.subscription_id, e
            ),
        }
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for ChangeFeedSubscriber {
    fn drop(&mut self) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        // Without an async context we can only stop listening; the feed
        // prunes the closed receiver on its next publish.
        warn!(
            "Subscription {} dropped without teardown",
            self.subscription_id
        );
        if let Some(task) = self.take_task() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ChangeFeedSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeedSubscriber")
            .field("subscription_id", &self.subscription_id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

async fn reload_on_change(
    subscription_id: Uuid,
    mut events: mpsc::Receiver<ChangeEvent>,
    store: Arc<PermissionStore>,
) {
    // Reloads run concurrently with the event loop; the store discards
    // results of superseded loads. Aborting this task drops the set and
    // with it every reload still running.
    let mut reloads = JoinSet::new();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    debug!(
                        "Grant relation changed ({}), reloading permissions",
                        event.kind
                    );
                    let store = store.clone();
                    reloads.spawn(async move {
                        store.load().await;
                    });
                }
                None => {
                    warn!(
                        "Change feed closed subscription {}, live permission updates stopped",
                        subscription_id
                    );
                    break;
                }
            },
            Some(_) = reloads.join_next(), if !reloads.is_empty() => {}
        }
    }

    while reloads.join_next().await.is_some() {}
}
