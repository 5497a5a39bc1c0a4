//! Loading the engine's view of the world inside a transaction.

use sqlx::PgConnection;
use workbench_core::engine::{AccessSnapshot, Operation};
use workbench_core::entity::{Capability, EntityRef, EntityState, EntityType};
use workbench_core::membership;
use workbench_core::permissions::Actor;
use workbench_core::types::{ActorId, ProjectId};

use crate::error::{DbError, DbResult};
use crate::models::project::Project;
use crate::repositories::{
    ActorRepo, AssignmentRepo, DssContainerRepo, EntityLockRepo, EntityRepo, PrivilegeRepo,
    ProjectRepo,
};

/// Load an actor with its global permissions.
pub(super) async fn load_actor(conn: &mut PgConnection, actor_id: ActorId) -> DbResult<Actor> {
    ActorRepo::load_principal(conn, actor_id)
        .await?
        .ok_or_else(|| DbError::not_found("actor", actor_id))
}

/// Load the engine state of any entity, row-locking it for the rest of the
/// transaction. Projects and other entities live in different tables.
pub(super) async fn lock_state(conn: &mut PgConnection, entity: EntityRef) -> DbResult<EntityState> {
    if entity.entity_type == EntityType::Project {
        return Ok(lock_project(conn, entity.id).await?.state());
    }

    let row = EntityRepo::find_for_update(&mut *conn, entity.id)
        .await?
        .filter(|row| row.entity_type == entity.entity_type.codename())
        .ok_or_else(|| DbError::not_found(entity.entity_type.codename(), entity.id))?;
    let project_ids = EntityRepo::project_ids(conn, entity.id).await?;
    Ok(row.state(project_ids)?)
}

/// Row-lock a project.
pub(super) async fn lock_project(conn: &mut PgConnection, id: ProjectId) -> DbResult<Project> {
    ProjectRepo::find_for_update(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("project", id))
}

/// Everything the engine needs to decide `op` for `actor` on `entity`.
pub(super) async fn load_snapshot(
    conn: &mut PgConnection,
    actor: Actor,
    entity: EntityState,
    op: &Operation,
) -> DbResult<AccessSnapshot> {
    let mut projects = entity.project_ids.clone();
    projects.extend(op.referenced_projects());
    projects.sort_unstable();
    projects.dedup();

    let grants = AssignmentRepo::grants_for_actor(&mut *conn, actor.id, &projects).await?;
    let mut snapshot = AccessSnapshot::new(actor, entity);
    snapshot.project_permissions = membership::permissions_by_project(&grants, snapshot.actor.id);

    // A new entity has no rows of its own yet.
    let existing = snapshot.entity.entity.id != 0;
    if existing {
        snapshot.privilege =
            PrivilegeRepo::find(&mut *conn, snapshot.entity.entity, snapshot.actor.id)
                .await?
                .map(|row| row.to_core())
                .transpose()?;
    }
    if existing && snapshot.entity.has(Capability::Lockable) {
        snapshot.locks = EntityLockRepo::for_entity(&mut *conn, snapshot.entity.entity)
            .await?
            .iter()
            .map(|row| row.to_record())
            .collect::<Result<_, _>>()?;
    }
    if let Some(attrs) = snapshot.entity.dss_attrs().copied() {
        snapshot.container = DssContainerRepo::find_by_id(conn, attrs.container_id)
            .await?
            .map(|row| row.to_core())
            .transpose()?;
    }

    tracing::debug!(
        actor_id = snapshot.actor.id,
        entity_type = %snapshot.entity.entity_type(),
        entity_id = snapshot.entity.entity.id,
        projects = snapshot.project_permissions.len(),
        has_override = snapshot.privilege.is_some(),
        locks = snapshot.locks.len(),
        "Access snapshot loaded"
    );
    Ok(snapshot)
}
