use std::collections::{BTreeSet, HashMap, HashSet};

use portaria_types::{ExpandedGrant, Module, ModuleId, Permission, PermissionId};

/// Materialized permissions of one identity plus the module and permission
/// catalogs, as produced by a single load.
///
/// A snapshot is never patched: every load builds a new one and the store
/// swaps it in as a whole.
#[derive(Debug, Clone, Default)]
pub struct PermissionSnapshot {
    grants: Vec<ExpandedGrant>,
    modules: Vec<Module>,
    permissions: Vec<Permission>,
    /// module name -> permission names
    index: HashMap<String, BTreeSet<String>>,
}

impl PermissionSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw query results. Duplicate grant rows for the
    /// same module and permission collapse into one entry; catalogs are
    /// ordered by display name, then machine name.
    pub fn build(
        grants: Vec<ExpandedGrant>,
        mut modules: Vec<Module>,
        mut permissions: Vec<Permission>,
    ) -> Self {
        modules.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.name.cmp(&b.name))
        });
        permissions.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut seen: HashSet<(ModuleId, PermissionId)> = HashSet::new();
        let mut unique = Vec::with_capacity(grants.len());
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();

        for entry in grants {
            if !seen.insert((entry.module.id.clone(), entry.permission.id.clone())) {
                continue;
            }
            index
                .entry(entry.module.name.clone())
                .or_default()
                .insert(entry.permission.name.clone());
            unique.push(entry);
        }

        Self {
            grants: unique,
            modules,
            permissions,
            index,
        }
    }

    /// Exact, case-sensitive membership check on machine names.
    pub fn has_permission(&self, module_name: &str, permission_name: &str) -> bool {
        self.index
            .get(module_name)
            .is_some_and(|perms| perms.contains(permission_name))
    }

    pub fn module_permissions(&self, module_name: &str) -> BTreeSet<String> {
        self.index.get(module_name).cloned().unwrap_or_default()
    }

    /// Deduplicated grants, one per (module, permission)
    pub fn grants(&self) -> &[ExpandedGrant] {
        &self.grants
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty() && self.modules.is_empty() && self.permissions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portaria_types::Grant;
    use uuid::Uuid;

    fn module(id: &str, name: &str, display: &str) -> Module {
        Module {
            id: id.into(),
            name: name.to_string(),
            display_name: display.to_string(),
            description: None,
        }
    }

    fn permission(id: &str, name: &str, display: &str) -> Permission {
        Permission {
            id: id.into(),
            name: name.to_string(),
            display_name: display.to_string(),
            description: None,
        }
    }

    fn expanded(module: &Module, permission: &Permission) -> ExpandedGrant {
        ExpandedGrant {
            grant: Grant {
                id: Uuid::new_v4(),
                identity_id: "u2".into(),
                module_id: module.id.clone(),
                permission_id: permission.id.clone(),
                granted_by: "root".into(),
                created_at: Utc::now(),
            },
            module: module.clone(),
            permission: permission.clone(),
        }
    }

    #[test]
    fn test_membership_is_exact_and_case_sensitive() {
        let agenda = module("m1", "agenda", "Agenda");
        let view = permission("p1", "view", "Visualizar");
        let snapshot = PermissionSnapshot::build(vec![expanded(&agenda, &view)], vec![], vec![]);

        assert!(snapshot.has_permission("agenda", "view"));
        assert!(!snapshot.has_permission("Agenda", "view"));
        assert!(!snapshot.has_permission("agenda", "View"));
        assert!(!snapshot.has_permission("agenda", "edit"));
        assert!(!snapshot.has_permission("pacientes", "view"));
    }

    #[test]
    fn test_duplicate_rows_count_once() {
        let agenda = module("m1", "agenda", "Agenda");
        let view = permission("p1", "view", "Visualizar");
        let snapshot = PermissionSnapshot::build(
            vec![expanded(&agenda, &view), expanded(&agenda, &view)],
            vec![],
            vec![],
        );

        assert_eq!(snapshot.grants().len(), 1);
        assert_eq!(
            snapshot.module_permissions("agenda"),
            BTreeSet::from(["view".to_string()])
        );
    }

    #[test]
    fn test_catalogs_sorted_by_display_then_name() {
        let snapshot = PermissionSnapshot::build(
            vec![],
            vec![
                module("m3", "pacientes", "Pacientes"),
                module("m2", "agenda_b", "Agenda"),
                module("m1", "agenda_a", "Agenda"),
            ],
            vec![
                permission("p2", "view", "Visualizar"),
                permission("p1", "edit", "Editar"),
            ],
        );

        let names: Vec<&str> = snapshot.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["agenda_a", "agenda_b", "pacientes"]);
        let names: Vec<&str> = snapshot
            .permissions()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["edit", "view"]);
    }

    #[test]
    fn test_empty_snapshot_denies_everything() {
        let snapshot = PermissionSnapshot::empty();
        assert!(snapshot.is_empty());
        assert!(!snapshot.has_permission("agenda", "view"));
        assert!(snapshot.module_permissions("agenda").is_empty());
    }
}
