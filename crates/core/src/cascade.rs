//! Side effects that follow an allowed mutation.
//!
//! The engine never writes. Once a decision is `Ok`, the caller asks this
//! module which follow-up writes are due and executes them in the same
//! transaction as the primary mutation.

use crate::entity::{Capability, EntityRef, EntityState, EntityType};
use crate::trusted::TrustedContext;
use crate::types::{ActorId, ProjectId};

/// A follow-up write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cascade {
    /// Insert the creator's `full_access = ALLOW` override.
    GrantOwner { entity: EntityRef, actor_id: ActorId },
    /// Upsert `view = ALLOW, edit = ALLOW` for an assignee or attendee.
    GrantParticipant { entity: EntityRef, actor_id: ActorId },
    /// Withdraw a participant's view+edit grant. Explicit DENY values stay
    /// and the row is only removed once it is fully neutral.
    RevokeParticipant { entity: EntityRef, actor_id: ActorId },
    /// Lock a freshly created entity for its creator.
    AcquireLock { entity: EntityRef, actor_id: ActorId },
    /// Make the creator of a project its first manager.
    AssignManager { project_id: ProjectId, actor_id: ActorId },
}

/// Cascades due after `entity` has been created by `creator`.
///
/// `assignees` are the initial assignees/attendees. Imported entities are
/// not auto-locked: the import actor never edits interactively.
pub fn on_create(
    entity: &EntityState,
    creator: ActorId,
    assignees: &[ActorId],
    trusted: &TrustedContext,
) -> Vec<Cascade> {
    let mut cascades = vec![Cascade::GrantOwner {
        entity: entity.entity,
        actor_id: creator,
    }];

    if entity.entity_type() == EntityType::Project {
        cascades.push(Cascade::AssignManager {
            project_id: entity.entity.id,
            actor_id: creator,
        });
    }

    if entity.has(Capability::HasAssignees) {
        cascades.extend(assignees.iter().filter(|a| **a != creator).map(|a| {
            Cascade::GrantParticipant {
                entity: entity.entity,
                actor_id: *a,
            }
        }));
    }

    if entity.has(Capability::Lockable) && !trusted.is_trusted() {
        cascades.push(Cascade::AcquireLock {
            entity: entity.entity,
            actor_id: creator,
        });
    }

    cascades
}

/// Cascades due after the participant set of `entity` changed.
pub fn on_participants_changed(
    entity: &EntityState,
    added: &[ActorId],
    removed: &[ActorId],
) -> Vec<Cascade> {
    if !entity.has(Capability::HasAssignees) {
        return Vec::new();
    }
    let grants = added.iter().map(|a| Cascade::GrantParticipant {
        entity: entity.entity,
        actor_id: *a,
    });
    let revokes = removed.iter().map(|a| Cascade::RevokeParticipant {
        entity: entity.entity,
        actor_id: *a,
    });
    grants.chain(revokes).collect()
}
