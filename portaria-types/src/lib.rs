/*!
 * Minimal types-only crate for the portaria data model
 *
 * This crate contains the entities the authorization core and the admin
 * frontend share: identities, the module and permission catalogs, grants
 * and the guard outcome. It carries no runtime dependencies so the
 * TypeScript generator stays fast to compile.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

// Re-export core types for easier access
pub use chrono;
pub use serde;
pub use ts_rs;
pub use uuid;

/// Role label that bypasses every permission check.
pub const SUPER_ADMIN_ROLE: &str = "admin";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
        #[ts(export)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Unique id of an authenticated actor
    IdentityId
);
string_id!(
    /// Unique id of a protectable module
    ModuleId
);
string_id!(
    /// Unique id of a catalog permission
    PermissionId
);

/// An authenticated actor. Immutable for the duration of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub id: IdentityId,
    /// Free-text role label, e.g. "Admin" or "Coordenador"
    pub role: String,
}

impl Identity {
    pub fn new(id: impl Into<IdentityId>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    /// True if the role label matches the reserved super-admin role,
    /// ignoring letter case.
    pub fn is_super_admin(&self) -> bool {
        self.role.to_lowercase() == SUPER_ADMIN_ROLE
    }
}

/// A named protectable area of the application, e.g. "pacientes".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Module {
    pub id: ModuleId,
    /// Stable machine name used in permission checks
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named capability within a module, e.g. "view" or "edit".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Permission {
    pub id: PermissionId,
    /// Stable machine name used in permission checks
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Persisted record that an identity holds a permission within a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Grant {
    pub id: Uuid,
    pub identity_id: IdentityId,
    pub module_id: ModuleId,
    pub permission_id: PermissionId,
    /// Identity of the administrator who created the grant
    pub granted_by: IdentityId,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// True if this row ties the same identity, module and permission.
    pub fn matches(
        &self,
        identity_id: &IdentityId,
        module_id: &ModuleId,
        permission_id: &PermissionId,
    ) -> bool {
        &self.identity_id == identity_id
            && &self.module_id == module_id
            && &self.permission_id == permission_id
    }
}

/// A grant joined with the module and permission it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpandedGrant {
    pub grant: Grant,
    pub module: Module,
    pub permission: Permission,
}

/// Kind of mutation reported by the change feed. Consumers must not rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "insert"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Opaque "something changed" notification on the grant relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[ts(type = "string")]
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            occurred_at: Utc::now(),
        }
    }
}

/// Outcome of an access guard evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GuardState {
    Loading,
    Allowed,
    Denied,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardState::Loading => write!(f, "loading"),
            GuardState::Allowed => write!(f, "allowed"),
            GuardState::Denied => write!(f, "denied"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_ignores_case() {
        for role in ["admin", "Admin", "ADMIN", "aDmIn"] {
            assert!(Identity::new("u1", role).is_super_admin(), "{role}");
        }
    }

    #[test]
    fn test_other_roles_are_not_super_admin() {
        for role in ["Coordenador", "administrator", "", "admins"] {
            assert!(!Identity::new("u1", role).is_super_admin(), "{role}");
        }
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let grant = Grant {
            id: Uuid::nil(),
            identity_id: "u1".into(),
            module_id: "m-agenda".into(),
            permission_id: "p-view".into(),
            granted_by: "root".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&grant).unwrap();
        assert_eq!(json["identity_id"], "u1");
        assert_eq!(json["module_id"], "m-agenda");
        assert_eq!(json["permission_id"], "p-view");
    }

    #[test]
    fn test_guard_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&GuardState::Allowed).unwrap(),
            "\"allowed\""
        );
    }
}
