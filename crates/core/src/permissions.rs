//! Global permission catalog.
//!
//! Permission keys follow the `<action>_<entity_type>` convention, with an
//! optional `_without_project` suffix that only applies to entities that have
//! no project association (e.g. `add_task_without_project`).

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::types::ActorId;

/// A set of permission codenames (`view_task`, `change_parent_project`, ...).
pub type PermissionSet = HashSet<String>;

/// Suffix for permissions that apply to entities without any project.
pub const WITHOUT_PROJECT_SUFFIX: &str = "_without_project";

/// Actions that appear in permission keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add,
    View,
    Edit,
    Delete,
    Trash,
    Restore,
    ChangeParent,
}

impl Action {
    /// The action part of a permission key. [`Action::Edit`] is `change`.
    pub fn codename(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::View => "view",
            Action::Edit => "change",
            Action::Delete => "delete",
            Action::Trash => "trash",
            Action::Restore => "restore",
            Action::ChangeParent => "change_parent",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}

/// Build the `<action>_<entity_type>` key.
pub fn permission_key(action: Action, entity_type: EntityType) -> String {
    format!("{}_{}", action.codename(), entity_type.codename())
}

/// Build the `<action>_<entity_type>_without_project` key.
pub fn without_project_key(action: Action, entity_type: EntityType) -> String {
    format!("{}{WITHOUT_PROJECT_SUFFIX}", permission_key(action, entity_type))
}

/// An authenticated identity with its global permission set.
///
/// The permission set is the union of the actor's group permissions and
/// direct permissions; the persistence layer flattens it before evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub is_superuser: bool,
    pub permissions: PermissionSet,
}

impl Actor {
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            is_superuser: false,
            permissions: PermissionSet::new(),
        }
    }

    pub fn superuser(id: ActorId) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(id)
        }
    }

    pub fn with_permissions<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn has_perm(&self, key: &str) -> bool {
        self.permissions.contains(key)
    }
}

/// Whether `actor` holds the global permission for `action` on `entity_type`.
///
/// `project_bound` is `true` when the entity has at least one project
/// association; only unbound entities consider the `_without_project` key.
pub fn has_global_permission(
    actor: &Actor,
    entity_type: EntityType,
    action: Action,
    project_bound: bool,
) -> bool {
    if actor.is_superuser {
        return true;
    }
    if actor.has_perm(&permission_key(action, entity_type)) {
        return true;
    }
    !project_bound && actor.has_perm(&without_project_key(action, entity_type))
}
