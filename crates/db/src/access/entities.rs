//! Entity lifecycle, assignee and project-link commands.

use sqlx::PgConnection;
use workbench_core::cascade;
use workbench_core::engine::Operation;
use workbench_core::entity::{Capability, EditKind, EntityRef, EntityState, EntityType};
use workbench_core::error::CoreError;
use workbench_core::trusted::TrustedContext;
use workbench_core::types::{ActorId, DbId, ProjectId};

use super::snapshot::{load_actor, load_snapshot, lock_project, lock_state};
use super::Workbench;
use crate::error::{DbError, DbResult};
use crate::models::entity::{CreateEntity, EditEntity, Entity};
use crate::repositories::{
    DssContainerRepo, EntityLockRepo, EntityRepo, PrivilegeRepo, ProjectRepo,
};

impl Workbench {
    // -----------------------------------------------------------------------
    // Create / view / edit
    // -----------------------------------------------------------------------

    /// Create an entity, provisioning the creator's owner override, the
    /// assignees' participant overrides and the creation lock.
    pub async fn create_entity(&self, actor_id: ActorId, input: &CreateEntity) -> DbResult<Entity> {
        let mut tx = self.pool.begin().await?;
        let entity = self
            .create_entity_in(&mut tx, actor_id, input, &TrustedContext::none())
            .await?;
        tx.commit().await?;
        Ok(entity)
    }

    pub(super) async fn create_entity_in(
        &self,
        conn: &mut PgConnection,
        actor_id: ActorId,
        input: &CreateEntity,
        trusted: &TrustedContext,
    ) -> DbResult<Entity> {
        validate_create(input)?;
        if let Some(container_id) = input.dss_container_id {
            DssContainerRepo::find_by_id(&mut *conn, container_id)
                .await?
                .ok_or_else(|| DbError::not_found("dss_container", container_id))?;
        }
        for &project_id in &input.project_ids {
            ensure_project_usable(&mut *conn, project_id).await?;
        }

        let actor = load_actor(&mut *conn, actor_id).await?;
        let imported = trusted.is_trusted();
        let pending = input.state(actor_id, imported);
        let snapshot = load_snapshot(&mut *conn, actor, pending, &Operation::Create).await?;
        self.decide(&snapshot, Operation::Create, trusted)?;

        let entity = EntityRepo::create(&mut *conn, input, actor_id, imported).await?;
        let created = entity.state(input.project_ids.clone())?;
        let cascades = cascade::on_create(&created, actor_id, &input.assignee_ids, trusted);
        self.apply_cascades(&mut *conn, &cascades).await?;

        tracing::info!(
            actor_id,
            entity_type = %input.entity_type,
            entity_id = entity.id,
            imported,
            projects = input.project_ids.len(),
            "Entity created"
        );
        Ok(entity)
    }

    /// Return the engine's view of an entity the actor may see.
    pub async fn view_entity(&self, actor_id: ActorId, entity: EntityRef) -> DbResult<EntityState> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        let state = lock_state(&mut *tx, entity).await?;
        let snapshot = load_snapshot(&mut *tx, actor, state, &Operation::View).await?;
        self.decide(&snapshot, Operation::View, &TrustedContext::none())?;
        tx.commit().await?;
        Ok(snapshot.entity)
    }

    /// Edit an entity. The engine decides every kind of change the input
    /// actually makes against the locked row, so the caller cannot relabel a
    /// content change as a metadata edit. Bumps the audit version unless the
    /// input matches the row.
    pub async fn edit_entity(
        &self,
        actor_id: ActorId,
        entity_id: DbId,
        input: &EditEntity,
    ) -> DbResult<Entity> {
        let mut tx = self.pool.begin().await?;
        let row = EntityRepo::find_for_update(&mut *tx, entity_id)
            .await?
            .ok_or_else(|| DbError::not_found("entity", entity_id))?;
        let project_ids = EntityRepo::project_ids(&mut *tx, entity_id).await?;
        let state = row.state(project_ids)?;

        let target_container = match input.directory_id {
            Some(directory_id) if directory_id != row.directory_id => {
                if !state.has(Capability::DssOverridable) {
                    return Err(CoreError::validation(
                        "directory",
                        format!("{} cannot be placed in a directory", state.entity_type()),
                    )
                    .into());
                }
                move_target_container(&mut tx, &row, directory_id).await?
            }
            _ => None,
        };
        let kinds = input.kinds(&row, target_container);
        if kinds.contains(&EditKind::ToggleDssFlag) && !state.has(Capability::DssOverridable) {
            return Err(CoreError::validation(
                "is_dss",
                format!("{} carries no DSS flag", state.entity_type()),
            )
            .into());
        }

        // A no-op still needs the right to edit.
        let ops: Vec<Operation> = if kinds.is_empty() {
            vec![Operation::Edit(EditKind::MetadataOnly)]
        } else {
            kinds.iter().map(|kind| Operation::Edit(*kind)).collect()
        };
        self.authorize_all(&mut tx, actor_id, state, &ops).await?;
        if kinds.is_empty() {
            tx.commit().await?;
            return Ok(row);
        }

        let entity = EntityRepo::update(&mut *tx, entity_id, input)
            .await?
            .ok_or_else(|| DbError::not_found("entity", entity_id))?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id,
            kinds = ?kinds,
            version = entity.version,
            "Entity edited"
        );
        Ok(entity)
    }

    // -----------------------------------------------------------------------
    // Soft-delete lifecycle
    // -----------------------------------------------------------------------

    /// Move an entity (or project) to the trash.
    pub async fn trash_entity(&self, actor_id: ActorId, entity: EntityRef) -> DbResult<()> {
        self.set_deleted(actor_id, entity, true).await
    }

    /// Take an entity (or project) out of the trash.
    pub async fn restore_entity(&self, actor_id: ActorId, entity: EntityRef) -> DbResult<()> {
        self.set_deleted(actor_id, entity, false).await
    }

    async fn set_deleted(&self, actor_id: ActorId, entity: EntityRef, deleted: bool) -> DbResult<()> {
        let op = if deleted {
            Operation::Trash
        } else {
            Operation::Restore
        };
        let mut tx = self.pool.begin().await?;
        let state = lock_state(&mut *tx, entity).await?;
        self.authorize(&mut tx, actor_id, state, op).await?;

        if entity.entity_type == EntityType::Project {
            ProjectRepo::set_deleted(&mut *tx, entity.id, deleted).await?;
        } else {
            EntityRepo::set_deleted(&mut *tx, entity.id, deleted).await?;
        }
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id = entity.id,
            deleted,
            "Entity lifecycle changed"
        );
        Ok(())
    }

    /// Permanently delete a trashed entity (or project) together with its
    /// locks and overrides. Projects hand their children to their parent.
    pub async fn delete_entity(&self, actor_id: ActorId, entity: EntityRef) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let state = lock_state(&mut *tx, entity).await?;
        self.authorize(&mut tx, actor_id, state, Operation::Delete).await?;

        EntityLockRepo::delete_for_entity(&mut *tx, entity).await?;
        PrivilegeRepo::delete_for_entity(&mut *tx, entity).await?;
        if entity.entity_type == EntityType::Project {
            self.remove_project_from_tree(&mut tx, entity.id).await?;
        } else {
            EntityRepo::hard_delete(&mut *tx, entity.id).await?;
        }
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id = entity.id,
            "Entity deleted"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Assignees
    // -----------------------------------------------------------------------

    /// Add an assignee (or attendee), granting them view and edit.
    pub async fn add_assignee(
        &self,
        actor_id: ActorId,
        entity_id: DbId,
        assignee_id: ActorId,
    ) -> DbResult<bool> {
        self.change_assignee(actor_id, entity_id, assignee_id, true).await
    }

    /// Remove an assignee (or attendee) and their participant override.
    pub async fn remove_assignee(
        &self,
        actor_id: ActorId,
        entity_id: DbId,
        assignee_id: ActorId,
    ) -> DbResult<bool> {
        self.change_assignee(actor_id, entity_id, assignee_id, false).await
    }

    async fn change_assignee(
        &self,
        actor_id: ActorId,
        entity_id: DbId,
        assignee_id: ActorId,
        add: bool,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let state = lock_entity_row(&mut tx, entity_id).await?;
        if !state.has(Capability::HasAssignees) {
            return Err(CoreError::validation(
                "assignees",
                format!("{} has no assignees", state.entity_type()),
            )
            .into());
        }
        load_actor(&mut *tx, assignee_id).await?;
        let entity = state.entity;
        self.authorize(&mut tx, actor_id, state.clone(), Operation::Edit(EditKind::Fields))
            .await?;

        let changed = if add {
            EntityRepo::add_assignee(&mut *tx, entity_id, assignee_id).await?
        } else {
            EntityRepo::remove_assignee(&mut *tx, entity_id, assignee_id).await?
        };
        if changed {
            let (added, removed) = if add {
                (vec![assignee_id], Vec::new())
            } else {
                (Vec::new(), vec![assignee_id])
            };
            let cascades = cascade::on_participants_changed(&state, &added, &removed);
            self.apply_cascades(&mut tx, &cascades).await?;
        }
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id,
            assignee_id,
            added = add,
            changed,
            "Assignees changed"
        );
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Project links
    // -----------------------------------------------------------------------

    /// Link an entity to a project. Returns `false` if it already was.
    pub async fn add_to_project(
        &self,
        actor_id: ActorId,
        entity_id: DbId,
        project_id: ProjectId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let state = lock_entity_row(&mut tx, entity_id).await?;
        ensure_project_usable(&mut tx, project_id).await?;
        self.authorize(&mut tx, actor_id, state, Operation::AddToProject(project_id))
            .await?;

        let linked = EntityRepo::add_project(&mut *tx, entity_id, project_id).await?;
        tx.commit().await?;

        tracing::info!(actor_id, entity_id, project_id, linked, "Entity added to project");
        Ok(linked)
    }

    /// Unlink an entity from a project.
    pub async fn remove_from_project(
        &self,
        actor_id: ActorId,
        entity_id: DbId,
        project_id: ProjectId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let state = lock_entity_row(&mut tx, entity_id).await?;
        self.authorize(&mut tx, actor_id, state, Operation::RemoveFromProject(project_id))
            .await?;

        let unlinked = EntityRepo::remove_project(&mut *tx, entity_id, project_id).await?;
        tx.commit().await?;

        tracing::info!(actor_id, entity_id, project_id, "Entity removed from project");
        Ok(unlinked)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Load the actor and snapshot for an already locked entity and decide.
    pub(super) async fn authorize(
        &self,
        conn: &mut PgConnection,
        actor_id: ActorId,
        state: EntityState,
        op: Operation,
    ) -> DbResult<()> {
        self.authorize_all(conn, actor_id, state, &[op]).await
    }

    /// Decide several operations against one snapshot. All must pass.
    async fn authorize_all(
        &self,
        conn: &mut PgConnection,
        actor_id: ActorId,
        state: EntityState,
        ops: &[Operation],
    ) -> DbResult<()> {
        let Some(first) = ops.first() else {
            return Ok(());
        };
        let actor = load_actor(&mut *conn, actor_id).await?;
        let snapshot = load_snapshot(conn, actor, state, first).await?;
        ops.iter()
            .try_for_each(|op| self.decide(&snapshot, *op, &TrustedContext::none()))
    }
}

/// Row-lock an entity from the `entities` table by ID.
async fn lock_entity_row(conn: &mut PgConnection, entity_id: DbId) -> DbResult<EntityState> {
    let row = EntityRepo::find_for_update(&mut *conn, entity_id)
        .await?
        .ok_or_else(|| DbError::not_found("entity", entity_id))?;
    let project_ids = EntityRepo::project_ids(conn, entity_id).await?;
    Ok(row.state(project_ids)?)
}

/// The container a move into `directory_id` lands in. Moving to the top
/// level keeps the entity in its own container.
async fn move_target_container(
    conn: &mut PgConnection,
    row: &Entity,
    directory_id: Option<DbId>,
) -> DbResult<Option<DbId>> {
    let Some(directory_id) = directory_id else {
        return Ok(row.dss_container_id.filter(|_| row.is_dss));
    };
    if EntityRepo::directory_chain(&mut *conn, directory_id)
        .await?
        .contains(&row.id)
    {
        return Err(CoreError::validation(
            "directory",
            format!("Entity {} cannot be moved below itself", row.id),
        )
        .into());
    }

    let target = EntityRepo::find_by_id(conn, directory_id)
        .await?
        .ok_or_else(|| DbError::not_found("directory", directory_id))?;
    if !matches!(target.kind()?, EntityType::Directory | EntityType::Drive) {
        return Err(CoreError::validation(
            "directory",
            format!("Entity {directory_id} is not a directory or drive"),
        )
        .into());
    }
    if target.deleted {
        return Err(CoreError::validation(
            "directory",
            format!("Directory {directory_id} is in the trash"),
        )
        .into());
    }
    Ok(target.dss_container_id.filter(|_| target.is_dss))
}

/// A project that exists and is not in the trash.
async fn ensure_project_usable(conn: &mut PgConnection, project_id: ProjectId) -> DbResult<()> {
    let project = lock_project(conn, project_id).await?;
    if project.deleted {
        return Err(CoreError::validation(
            "projects",
            format!("Project {project_id} is in the trash"),
        )
        .into());
    }
    Ok(())
}

fn validate_create(input: &CreateEntity) -> Result<(), CoreError> {
    let entity_type = input.entity_type;
    if entity_type == EntityType::Project {
        return Err(CoreError::validation(
            "entity_type",
            "Projects are created through create_project",
        ));
    }
    if !input.project_ids.is_empty() && !entity_type.has(Capability::ProjectScoped) {
        return Err(CoreError::validation(
            "projects",
            format!("{entity_type} cannot be linked to projects"),
        ));
    }
    if !input.assignee_ids.is_empty() && !entity_type.has(Capability::HasAssignees) {
        return Err(CoreError::validation(
            "assignees",
            format!("{entity_type} has no assignees"),
        ));
    }
    if input.dss_container_id.is_some() && !entity_type.has(Capability::DssOverridable) {
        return Err(CoreError::validation(
            "dss_container_id",
            format!("{entity_type} cannot be stored in a DSS container"),
        ));
    }
    Ok(())
}
