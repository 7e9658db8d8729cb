use std::sync::Arc;

use portaria_types::{GuardState, Identity};
use tracing::debug;

use super::store::PermissionStore;

/// Standard notice shown when access is denied and the caller gave no fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedNotice {
    pub title: String,
    pub message: String,
}

impl Default for RestrictedNotice {
    fn default() -> Self {
        Self {
            title: "Acesso restrito".to_string(),
            message: "You do not have permission to access this area. Contact an administrator if you need access.".to_string(),
        }
    }
}

/// What a guarded view shows for the current guard state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    /// The protected content
    Content(T),
    /// The caller-supplied fallback
    Fallback(T),
    Restricted(RestrictedNotice),
    Loading,
}

impl<T> Rendered<T> {
    pub fn is_content(&self) -> bool {
        matches!(self, Rendered::Content(_))
    }
}

/// Gates protected content on one (module, permission) pair.
///
/// The identity is injected by the caller. A super admin is allowed straight
/// from the identity's role label, without waiting for or consulting the
/// permission store.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    identity: Option<Identity>,
    store: Arc<PermissionStore>,
    module: String,
    permission: String,
}

impl AccessGuard {
    pub fn new(
        identity: Option<Identity>,
        store: Arc<PermissionStore>,
        module: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            store,
            module: module.into(),
            permission: permission.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Evaluate against whatever the store holds right now.
    pub fn state(&self) -> GuardState {
        let Some(identity) = &self.identity else {
            return GuardState::Denied;
        };

        if identity.is_super_admin() {
            return GuardState::Allowed;
        }

        if !self.store.status().settled {
            return GuardState::Loading;
        }

        if self.store.has_permission(&self.module, &self.permission) {
            GuardState::Allowed
        } else {
            GuardState::Denied
        }
    }

    /// Wait for the session's first load to settle, then evaluate.
    pub async fn resolve(&self) -> GuardState {
        let state = self.state();
        if state != GuardState::Loading {
            return state;
        }

        self.store.wait_until_settled().await;
        let state = self.state();
        debug!(
            "Guard {}/{} resolved to {}",
            self.module, self.permission, state
        );
        state
    }

    /// Produce the view for the current state. `children` is only called
    /// when access is allowed.
    pub fn render<T>(&self, children: impl FnOnce() -> T, fallback: Option<T>) -> Rendered<T> {
        match self.state() {
            GuardState::Allowed => Rendered::Content(children()),
            GuardState::Loading => Rendered::Loading,
            GuardState::Denied => match fallback {
                Some(fallback) => Rendered::Fallback(fallback),
                None => Rendered::Restricted(RestrictedNotice::default()),
            },
        }
    }
}
