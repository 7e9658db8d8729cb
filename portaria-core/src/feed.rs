use async_trait::async_trait;
use portaria_types::ChangeEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AuthorizationError;

/// A live subscription to mutations of the grant relation.
///
/// The transport delivers one opaque event per insert, update or delete.
/// `events` yields `None` once the transport closed the subscription.
#[derive(Debug)]
pub struct ChangeSubscription {
    pub id: Uuid,
    pub events: mpsc::Receiver<ChangeEvent>,
}

/// Change notification transport for the grant relation.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to all change events on the grant relation, any row.
    async fn subscribe(&self) -> Result<ChangeSubscription, AuthorizationError>;

    /// Release the server side of a subscription. Unknown ids are a no-op.
    async fn unsubscribe(&self, id: Uuid) -> Result<(), AuthorizationError>;
}
