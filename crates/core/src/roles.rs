//! Well-known project role names and their permission bundles.
//!
//! These must match the seed data in `20260301000002_seed_roles.sql`.

use crate::entity::EntityType;
use crate::permissions::{permission_key, Action};

pub const ROLE_PROJECT_MANAGER: &str = "Project Manager";
pub const ROLE_PROJECT_MEMBER: &str = "Project Member";
pub const ROLE_OBSERVER: &str = "Observer";
pub const ROLE_STORAGE_CURATOR: &str = "Storage Curator";

pub const SEEDED_ROLES: &[&str] = &[
    ROLE_PROJECT_MANAGER,
    ROLE_PROJECT_MEMBER,
    ROLE_OBSERVER,
    ROLE_STORAGE_CURATOR,
];

const MANAGER_ACTIONS: &[Action] = &[
    Action::Add,
    Action::View,
    Action::Edit,
    Action::Delete,
    Action::Trash,
    Action::Restore,
];

const MEMBER_ACTIONS: &[Action] = &[Action::Add, Action::View, Action::Edit, Action::Trash];

const CURATED_TYPES: &[EntityType] = &[EntityType::File, EntityType::Directory, EntityType::Drive];

/// Permission keys granted by a seeded role. Unknown roles grant nothing.
pub fn default_permissions(role: &str) -> Vec<String> {
    match role {
        ROLE_PROJECT_MANAGER => {
            let mut keys = keys_for(MANAGER_ACTIONS, EntityType::ALL);
            keys.push(permission_key(Action::ChangeParent, EntityType::Project));
            keys
        }
        ROLE_PROJECT_MEMBER => {
            let content: Vec<EntityType> = EntityType::ALL
                .iter()
                .copied()
                .filter(|t| *t != EntityType::Project)
                .collect();
            let mut keys = keys_for(MEMBER_ACTIONS, &content);
            keys.push(permission_key(Action::View, EntityType::Project));
            keys
        }
        ROLE_OBSERVER => keys_for(&[Action::View], EntityType::ALL),
        ROLE_STORAGE_CURATOR => keys_for(&[Action::View, Action::Edit], CURATED_TYPES),
        _ => Vec::new(),
    }
}

fn keys_for(actions: &[Action], types: &[EntityType]) -> Vec<String> {
    actions
        .iter()
        .flat_map(|a| types.iter().map(move |t| permission_key(*a, *t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_can_change_parent() {
        let keys = default_permissions(ROLE_PROJECT_MANAGER);
        assert!(keys.contains(&"change_parent_project".to_string()));
        assert!(keys.contains(&"restore_labbook".to_string()));
    }

    #[test]
    fn test_member_cannot_delete_or_restore() {
        let keys = default_permissions(ROLE_PROJECT_MEMBER);
        assert!(keys.contains(&"trash_task".to_string()));
        assert!(!keys.contains(&"delete_task".to_string()));
        assert!(!keys.contains(&"restore_task".to_string()));
        assert!(!keys.contains(&"change_project".to_string()));
    }

    #[test]
    fn test_observer_is_view_only() {
        assert!(default_permissions(ROLE_OBSERVER)
            .iter()
            .all(|k| k.starts_with("view_")));
    }

    #[test]
    fn test_curator_scoped_to_storage() {
        let keys = default_permissions(ROLE_STORAGE_CURATOR);
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&"change_file".to_string()));
        assert!(!keys.contains(&"view_task".to_string()));
    }

    #[test]
    fn test_unknown_role_grants_nothing() {
        assert!(default_permissions("Janitor").is_empty());
    }
}
