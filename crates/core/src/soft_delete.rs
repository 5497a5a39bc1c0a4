//! Soft-delete lifecycle.
//!
//! ```text
//! ACTIVE ──trash──► TRASHED ──hard_delete──► DELETED
//!    ▲                 │
//!    └────restore──────┘
//! ```
//!
//! Types without the `SoftDeletable` capability skip the trash and may be
//! hard-deleted directly.

use serde::{Deserialize, Serialize};

use crate::entity::{Capability, EntityState};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Trashed,
    /// Terminal: the row is gone.
    Deleted,
}

impl LifecycleState {
    pub fn from_deleted(deleted: bool) -> Self {
        if deleted {
            LifecycleState::Trashed
        } else {
            LifecycleState::Active
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Trash,
    Restore,
    HardDelete,
}

/// Check that `transition` is legal from the entity's current state and
/// return the state it leads to.
pub fn check_transition(
    entity: &EntityState,
    transition: Transition,
) -> Result<LifecycleState, CoreError> {
    let state = LifecycleState::from_deleted(entity.deleted);
    let soft_deletable = entity.has(Capability::SoftDeletable);

    match (transition, state) {
        (Transition::Trash | Transition::Restore, _) if !soft_deletable => {
            Err(CoreError::validation(
                "deleted",
                format!("{} does not support the trash", entity.entity_type()),
            ))
        }
        (Transition::Trash, LifecycleState::Active) => Ok(LifecycleState::Trashed),
        (Transition::Trash, _) => Err(CoreError::validation(
            "deleted",
            format!("{} is already in the trash", entity.entity),
        )),
        (Transition::Restore, LifecycleState::Trashed) => Ok(LifecycleState::Active),
        (Transition::Restore, _) => Err(CoreError::validation(
            "deleted",
            format!("{} is not in the trash", entity.entity),
        )),
        (Transition::HardDelete, LifecycleState::Trashed) => Ok(LifecycleState::Deleted),
        (Transition::HardDelete, LifecycleState::Active) if !soft_deletable => {
            Ok(LifecycleState::Deleted)
        }
        (Transition::HardDelete, _) => Err(CoreError::validation(
            "deleted",
            format!("{} must be moved to the trash before it can be deleted", entity.entity),
        )),
    }
}

/// A trashed entity cannot be edited.
pub fn ensure_editable(entity: &EntityState) -> Result<(), CoreError> {
    if entity.deleted {
        return Err(CoreError::validation(
            "deleted",
            format!("{} is in the trash and cannot be edited", entity.entity),
        ));
    }
    Ok(())
}
