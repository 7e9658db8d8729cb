use std::sync::Arc;

use portaria_core::error::AuthorizationError;
use portaria_core::repository::{GrantRepository, NewGrant};
use portaria_types::{Grant, IdentityId, ModuleId, PermissionId};
use tracing::{error, info, warn};

use super::identity::CurrentIdentity;

/// Administrative grant and revoke operations on the persisted grant relation.
///
/// Successful writes do not touch any permission store; every open store
/// converges through its change feed subscription, including the one of the
/// administrator issuing the change.
#[derive(Clone)]
pub struct GrantService {
    repository: Arc<dyn GrantRepository>,
    identity: CurrentIdentity,
}

impl GrantService {
    pub fn new(repository: Arc<dyn GrantRepository>, identity: CurrentIdentity) -> Self {
        Self {
            repository,
            identity,
        }
    }

    /// Grant `permission_id` within `module_id` to `target`, recording the
    /// signed-in identity as granter. Granting twice may store a second row;
    /// the visible permissions are the same.
    pub async fn grant(
        &self,
        target: &IdentityId,
        module_id: &ModuleId,
        permission_id: &PermissionId,
    ) -> Result<Grant, AuthorizationError> {
        let Some(granter) = self.identity.current() else {
            warn!(
                "Rejected grant of {}/{} to {}: no signed-in identity",
                module_id, permission_id, target
            );
            return Err(AuthorizationError::Unauthenticated);
        };

        let new_grant = NewGrant {
            identity_id: target.clone(),
            module_id: module_id.clone(),
            permission_id: permission_id.clone(),
            granted_by: granter.id.clone(),
        };

        match self.repository.insert_grant(new_grant).await {
            Ok(grant) => {
                info!(
                    "Granted {}/{} to {} (by {}, grant {})",
                    module_id, permission_id, target, granter.id, grant.id
                );
                Ok(grant)
            }
            Err(e) => {
                error!(
                    "Failed to grant {}/{} to {}: {}",
                    module_id, permission_id, target, e
                );
                Err(e)
            }
        }
    }

    /// Remove every grant row for the exact triple. Revoking something the
    /// target never had succeeds and removes nothing.
    pub async fn revoke(
        &self,
        target: &IdentityId,
        module_id: &ModuleId,
        permission_id: &PermissionId,
    ) -> Result<usize, AuthorizationError> {
        let Some(revoker) = self.identity.current() else {
            warn!(
                "Rejected revoke of {}/{} from {}: no signed-in identity",
                module_id, permission_id, target
            );
            return Err(AuthorizationError::Unauthenticated);
        };

        match self
            .repository
            .delete_grants(target, module_id, permission_id)
            .await
        {
            Ok(removed) => {
                info!(
                    "Revoked {}/{} from {} (by {}, {} rows removed)",
                    module_id, permission_id, target, revoker.id, removed
                );
                Ok(removed)
            }
            Err(e) => {
                error!(
                    "Failed to revoke {}/{} from {}: {}",
                    module_id, permission_id, target, e
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for GrantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantService")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
