//! Per-object, per-actor privilege overrides.
//!
//! An override row has five axes (view, edit, delete, trash, restore) plus a
//! `full_access` shortcut, each ALLOW / DENY / NEUTRAL. Resolution order:
//!
//! 1. DENY on the axis wins, even over `full_access = ALLOW`.
//! 2. ALLOW on the axis or on `full_access` grants.
//! 3. Anything else is undecided and falls through to the caller's default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityRef, EntityState};
use crate::error::CoreError;
use crate::permissions::Action;
use crate::types::ActorId;

// ---------------------------------------------------------------------------
// Values and axes
// ---------------------------------------------------------------------------

/// Tri-state value stored per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivilegeValue {
    Allow,
    Deny,
    #[default]
    Neutral,
}

impl PrivilegeValue {
    pub fn as_str(self) -> &'static str {
        match self {
            PrivilegeValue::Allow => "ALLOW",
            PrivilegeValue::Deny => "DENY",
            PrivilegeValue::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for PrivilegeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivilegeValue {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(PrivilegeValue::Allow),
            "DENY" => Ok(PrivilegeValue::Deny),
            "NEUTRAL" => Ok(PrivilegeValue::Neutral),
            other => Err(CoreError::validation(
                "privilege",
                format!("Invalid privilege value '{other}'. Must be one of: ALLOW, DENY, NEUTRAL"),
            )),
        }
    }
}

/// The columns of an override row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeAxis {
    View,
    Edit,
    Delete,
    Trash,
    Restore,
    FullAccess,
}

impl PrivilegeAxis {
    /// The axis consulted for an action, if any. `Add` and `ChangeParent`
    /// are never granted per object.
    pub fn for_action(action: Action) -> Option<Self> {
        match action {
            Action::View => Some(PrivilegeAxis::View),
            Action::Edit => Some(PrivilegeAxis::Edit),
            Action::Delete => Some(PrivilegeAxis::Delete),
            Action::Trash => Some(PrivilegeAxis::Trash),
            Action::Restore => Some(PrivilegeAxis::Restore),
            Action::Add | Action::ChangeParent => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Override row
// ---------------------------------------------------------------------------

/// One override row keyed by `(entity, actor)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeOverride {
    pub entity: EntityRef,
    pub actor_id: ActorId,
    pub view: PrivilegeValue,
    pub edit: PrivilegeValue,
    pub delete: PrivilegeValue,
    pub trash: PrivilegeValue,
    pub restore: PrivilegeValue,
    pub full_access: PrivilegeValue,
    /// Role that owns this row; curator rows are protected.
    pub protected_role: Option<String>,
}

impl PrivilegeOverride {
    /// A row with every axis NEUTRAL.
    pub fn neutral(entity: EntityRef, actor_id: ActorId) -> Self {
        Self {
            entity,
            actor_id,
            view: PrivilegeValue::Neutral,
            edit: PrivilegeValue::Neutral,
            delete: PrivilegeValue::Neutral,
            trash: PrivilegeValue::Neutral,
            restore: PrivilegeValue::Neutral,
            full_access: PrivilegeValue::Neutral,
            protected_role: None,
        }
    }

    /// The row provisioned for an entity's creator.
    pub fn owner(entity: EntityRef, actor_id: ActorId) -> Self {
        Self {
            full_access: PrivilegeValue::Allow,
            ..Self::neutral(entity, actor_id)
        }
    }

    /// The row provisioned for an assignee or attendee.
    pub fn participant(entity: EntityRef, actor_id: ActorId) -> Self {
        Self {
            view: PrivilegeValue::Allow,
            edit: PrivilegeValue::Allow,
            ..Self::neutral(entity, actor_id)
        }
    }

    /// The row held by a storage curator.
    pub fn curator(entity: EntityRef, actor_id: ActorId, curator_role: &str) -> Self {
        Self {
            view: PrivilegeValue::Allow,
            edit: PrivilegeValue::Allow,
            protected_role: Some(curator_role.to_string()),
            ..Self::neutral(entity, actor_id)
        }
    }

    pub fn get(&self, axis: PrivilegeAxis) -> PrivilegeValue {
        match axis {
            PrivilegeAxis::View => self.view,
            PrivilegeAxis::Edit => self.edit,
            PrivilegeAxis::Delete => self.delete,
            PrivilegeAxis::Trash => self.trash,
            PrivilegeAxis::Restore => self.restore,
            PrivilegeAxis::FullAccess => self.full_access,
        }
    }

    pub fn set(&mut self, axis: PrivilegeAxis, value: PrivilegeValue) {
        let slot = match axis {
            PrivilegeAxis::View => &mut self.view,
            PrivilegeAxis::Edit => &mut self.edit,
            PrivilegeAxis::Delete => &mut self.delete,
            PrivilegeAxis::Trash => &mut self.trash,
            PrivilegeAxis::Restore => &mut self.restore,
            PrivilegeAxis::FullAccess => &mut self.full_access,
        };
        *slot = value;
    }

    pub fn is_curator(&self, curator_role: &str) -> bool {
        self.protected_role.as_deref() == Some(curator_role)
    }

    /// Withdraw the view+edit grant of an assignee. Explicit DENY values
    /// stay in place.
    pub fn revoke_participation(&mut self) {
        for axis in [PrivilegeAxis::View, PrivilegeAxis::Edit] {
            if self.get(axis) == PrivilegeValue::Allow {
                self.set(axis, PrivilegeValue::Neutral);
            }
        }
    }

    /// `true` when the row neither grants nor denies anything.
    pub fn is_neutral(&self) -> bool {
        self.protected_role.is_none()
            && [
                self.view,
                self.edit,
                self.delete,
                self.trash,
                self.restore,
                self.full_access,
            ]
            .iter()
            .all(|v| *v == PrivilegeValue::Neutral)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Stored value on `axis`, or NEUTRAL if there is no row.
pub fn resolve(row: Option<&PrivilegeOverride>, axis: PrivilegeAxis) -> PrivilegeValue {
    row.map(|r| r.get(axis)).unwrap_or_default()
}

/// Combine the axis and `full_access` into one tri-state verdict.
pub fn evaluate(row: Option<&PrivilegeOverride>, axis: PrivilegeAxis) -> PrivilegeValue {
    match resolve(row, axis) {
        PrivilegeValue::Deny => PrivilegeValue::Deny,
        PrivilegeValue::Allow => PrivilegeValue::Allow,
        PrivilegeValue::Neutral => match resolve(row, PrivilegeAxis::FullAccess) {
            PrivilegeValue::Allow => PrivilegeValue::Allow,
            _ => PrivilegeValue::Neutral,
        },
    }
}

/// Whether the override alone grants `axis`.
pub fn effective(row: Option<&PrivilegeOverride>, axis: PrivilegeAxis) -> bool {
    evaluate(row, axis) == PrivilegeValue::Allow
}

/// Reject direct edits or deletion of a curator-protected row.
///
/// Curator rows on DSS-backed entities can only go away through the
/// container-deletion cascade, or once the entity itself is trashed.
pub fn ensure_override_mutable(
    row: &PrivilegeOverride,
    entity: &EntityState,
    curator_role: &str,
) -> Result<(), CoreError> {
    if row.is_curator(curator_role) && entity.dss_attrs().is_some() && !entity.deleted {
        return Err(CoreError::validation(
            "protected_role",
            format!(
                "The '{curator_role}' privileges on {} are managed by the storage container \
                 and cannot be changed",
                row.entity
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::roles::ROLE_STORAGE_CURATOR;

    fn task() -> EntityRef {
        EntityRef::new(EntityType::Task, 1)
    }

    #[test]
    fn test_resolve_absent_row_is_neutral() {
        assert_eq!(resolve(None, PrivilegeAxis::View), PrivilegeValue::Neutral);
        assert!(!effective(None, PrivilegeAxis::View));
    }

    #[test]
    fn test_full_access_grants_every_axis() {
        let row = PrivilegeOverride::owner(task(), 1);
        for axis in [
            PrivilegeAxis::View,
            PrivilegeAxis::Edit,
            PrivilegeAxis::Delete,
            PrivilegeAxis::Trash,
            PrivilegeAxis::Restore,
        ] {
            assert!(effective(Some(&row), axis));
        }
    }

    #[test]
    fn test_axis_deny_beats_full_access() {
        let mut row = PrivilegeOverride::owner(task(), 1);
        row.set(PrivilegeAxis::Delete, PrivilegeValue::Deny);
        assert_eq!(evaluate(Some(&row), PrivilegeAxis::Delete), PrivilegeValue::Deny);
        assert!(effective(Some(&row), PrivilegeAxis::Edit));
    }

    #[test]
    fn test_participant_grants_view_and_edit_only() {
        let row = PrivilegeOverride::participant(task(), 2);
        assert!(effective(Some(&row), PrivilegeAxis::View));
        assert!(effective(Some(&row), PrivilegeAxis::Edit));
        assert!(!effective(Some(&row), PrivilegeAxis::Delete));
        assert!(!effective(Some(&row), PrivilegeAxis::Restore));
    }

    #[test]
    fn test_revoked_participant_row_is_neutral() {
        let mut row = PrivilegeOverride::participant(task(), 2);
        row.revoke_participation();
        assert!(row.is_neutral());
    }

    #[test]
    fn test_revoke_keeps_explicit_deny() {
        let mut row = PrivilegeOverride::participant(task(), 2);
        row.set(PrivilegeAxis::View, PrivilegeValue::Deny);
        row.revoke_participation();
        assert_eq!(row.view, PrivilegeValue::Deny);
        assert_eq!(row.edit, PrivilegeValue::Neutral);
        assert!(!row.is_neutral());
    }

    #[test]
    fn test_view_deny_keeps_edit_allow() {
        let mut row = PrivilegeOverride::participant(task(), 2);
        row.set(PrivilegeAxis::View, PrivilegeValue::Deny);
        assert!(!effective(Some(&row), PrivilegeAxis::View));
        assert!(effective(Some(&row), PrivilegeAxis::Edit));
    }

    #[test]
    fn test_revoke_keeps_owner_full_access() {
        let mut row = PrivilegeOverride::owner(task(), 1);
        row.view = PrivilegeValue::Allow;
        row.revoke_participation();
        assert!(!row.is_neutral());
        assert!(effective(Some(&row), PrivilegeAxis::View));
    }

    #[test]
    fn test_value_parse() {
        assert_eq!("DENY".parse::<PrivilegeValue>().unwrap(), PrivilegeValue::Deny);
        assert!("deny".parse::<PrivilegeValue>().is_err());
    }

    #[test]
    fn test_axis_for_action() {
        assert_eq!(PrivilegeAxis::for_action(Action::Edit), Some(PrivilegeAxis::Edit));
        assert_eq!(PrivilegeAxis::for_action(Action::Add), None);
    }

    #[test]
    fn test_curator_row_protected_on_active_dss_entity() {
        let file = EntityRef::new(EntityType::File, 3);
        let row = PrivilegeOverride::curator(file, 5, ROLE_STORAGE_CURATOR);
        let state = EntityState::new(file, 1).with_dss(1, true);
        let err = ensure_override_mutable(&row, &state, ROLE_STORAGE_CURATOR).unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "protected_role", .. }));
    }

    #[test]
    fn test_curator_row_mutable_once_entity_trashed() {
        let file = EntityRef::new(EntityType::File, 3);
        let row = PrivilegeOverride::curator(file, 5, ROLE_STORAGE_CURATOR);
        let state = EntityState::new(file, 1).with_dss(1, true).trashed();
        assert!(ensure_override_mutable(&row, &state, ROLE_STORAGE_CURATOR).is_ok());
    }

    #[test]
    fn test_curator_row_on_non_dss_entity_is_mutable() {
        let file = EntityRef::new(EntityType::File, 3);
        let row = PrivilegeOverride::curator(file, 5, ROLE_STORAGE_CURATOR);
        let state = EntityState::new(file, 1);
        assert!(ensure_override_mutable(&row, &state, ROLE_STORAGE_CURATOR).is_ok());
    }
}
