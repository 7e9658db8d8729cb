//! Authorization core
//!
//! Holds the permission snapshot of the signed-in identity, keeps it in sync
//! with the persisted grant relation through the change feed, exposes the
//! administrative grant/revoke operations and the access guard that gates
//! protected views.

pub mod feed;
pub mod grants;
pub mod guard;
pub mod identity;
pub mod session;
pub mod snapshot;
pub mod store;


// Re-export the main types for easy access
pub use feed::ChangeFeedSubscriber;
pub use grants::GrantService;
pub use guard::{AccessGuard, Rendered, RestrictedNotice};
pub use identity::{CurrentIdentity, SignIn};
pub use session::{AuthorizationSession, SessionManager};
pub use snapshot::PermissionSnapshot;
pub use store::{PermissionStore, StoreStatus};
