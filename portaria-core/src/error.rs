//! Error taxonomy of the authorization core.
//!
//! Read-path failures (permission loads) are logged and degraded to the last
//! known snapshot by the permission store; they never reach an access guard.
//! Write-path failures (grant/revoke) are returned to the caller so the
//! administrator gets an explicit failure signal.

use std::fmt::Display;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    /// A mutating operation was attempted without a signed-in acting identity
    #[error("No authenticated identity available for this operation")]
    Unauthenticated,

    /// Query, insert or delete against the backing store failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The change feed could not be established or maintained
    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl AuthorizationError {
    pub fn persistence(e: impl Display) -> Self {
        AuthorizationError::Persistence(e.to_string())
    }

    pub fn subscription(e: impl Display) -> Self {
        AuthorizationError::Subscription(e.to_string())
    }

    /// Subscription problems are logged only and never block a session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AuthorizationError::Subscription(_))
    }
}
