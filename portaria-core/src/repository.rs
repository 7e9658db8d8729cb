use async_trait::async_trait;
use portaria_types::{ExpandedGrant, Grant, IdentityId, Module, ModuleId, Permission, PermissionId};
use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;

/// Row to insert into the grant relation. Id and creation time are assigned
/// by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrant {
    pub identity_id: IdentityId,
    pub module_id: ModuleId,
    pub permission_id: PermissionId,
    pub granted_by: IdentityId,
}

/// Persistence and query layer for the grant relation and its catalogs.
///
/// Implementations may return duplicate grant rows for the same
/// (identity, module, permission) triple; consumers deduplicate.
#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// Grants held by `identity_id`, joined with their module and permission.
    /// Rows pointing at unknown catalog entries are omitted.
    async fn grants_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Vec<ExpandedGrant>, AuthorizationError>;

    async fn list_modules(&self) -> Result<Vec<Module>, AuthorizationError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, AuthorizationError>;

    async fn insert_grant(&self, grant: NewGrant) -> Result<Grant, AuthorizationError>;

    /// Delete every row matching the exact triple, returning how many were removed.
    async fn delete_grants(
        &self,
        identity_id: &IdentityId,
        module_id: &ModuleId,
        permission_id: &PermissionId,
    ) -> Result<usize, AuthorizationError>;
}
