//! Project creation, tree moves and role assignment commands.

use sqlx::PgConnection;
use workbench_core::cascade;
use workbench_core::engine::{Operation, ParentChange};
use workbench_core::entity::{EditKind, EntityRef, EntityState, EntityType};
use workbench_core::error::CoreError;
use workbench_core::membership::{self, AssignmentChange, MemberRole};
use workbench_core::trusted::TrustedContext;
use workbench_core::types::{ActorId, ProjectId};

use super::snapshot::{load_actor, load_snapshot, lock_project};
use super::Workbench;
use crate::error::{DbError, DbResult};
use crate::models::project::{CreateProject, Project};
use crate::models::role::RoleAssignment;
use crate::repositories::{AssignmentRepo, ProjectRepo, RoleRepo};

impl Workbench {
    // -----------------------------------------------------------------------
    // Tree
    // -----------------------------------------------------------------------

    /// Create a project. The creator becomes its owner and first manager.
    pub async fn create_project(&self, actor_id: ActorId, input: &CreateProject) -> DbResult<Project> {
        let mut tx = self.pool.begin().await?;
        if let Some(parent_id) = input.parent_id {
            ensure_parent_usable(&mut tx, parent_id).await?;
        }

        let actor = load_actor(&mut *tx, actor_id).await?;
        let pending = EntityState::new(EntityRef::new(EntityType::Project, 0), actor_id)
            .with_projects(input.parent_id);
        let snapshot = load_snapshot(&mut *tx, actor, pending, &Operation::Create).await?;
        self.decide(&snapshot, Operation::Create, &TrustedContext::none())?;

        let project = ProjectRepo::create(&mut *tx, input, actor_id).await?;
        let cascades = cascade::on_create(&project.state(), actor_id, &[], &TrustedContext::none());
        self.apply_cascades(&mut tx, &cascades).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            project_id = project.id,
            parent_id = ?project.parent_id,
            depth = project.depth,
            "Project created"
        );
        Ok(project)
    }

    /// Move a project under a new parent (or to the top level) and rebuild
    /// the moved subtree.
    pub async fn change_project_parent(
        &self,
        actor_id: ActorId,
        project_id: ProjectId,
        new_parent: Option<ProjectId>,
    ) -> DbResult<Project> {
        let mut tx = self.pool.begin().await?;
        let project = lock_project(&mut tx, project_id).await?;
        let new_parent_path = match new_parent {
            Some(parent_id) => ensure_parent_usable(&mut tx, parent_id).await?.path,
            None => Vec::new(),
        };
        membership::validate_parent_change(project_id, new_parent, &new_parent_path)?;

        let op = Operation::ChangeParent(ParentChange {
            old_parent: project.parent_id,
            new_parent,
        });
        self.authorize(&mut tx, actor_id, project.state(), op).await?;

        ProjectRepo::set_parent(&mut *tx, project_id, new_parent).await?;
        let rebuilt = ProjectRepo::rebuild_subtree(&mut *tx, project_id).await?;
        let moved = ProjectRepo::find_by_id(&mut *tx, project_id)
            .await?
            .ok_or_else(|| DbError::not_found("project", project_id))?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            project_id,
            old_parent = ?project.parent_id,
            new_parent = ?new_parent,
            rebuilt,
            "Project moved"
        );
        Ok(moved)
    }

    /// Permanently delete a trashed project. Its children move up to its
    /// parent.
    pub async fn delete_project(&self, actor_id: ActorId, project_id: ProjectId) -> DbResult<()> {
        self.delete_entity(actor_id, EntityRef::new(EntityType::Project, project_id))
            .await
    }

    /// Hand the children of a project being deleted to its parent, rebuild
    /// their subtrees, and delete the row.
    pub(super) async fn remove_project_from_tree(
        &self,
        conn: &mut PgConnection,
        project_id: ProjectId,
    ) -> DbResult<()> {
        let project = lock_project(&mut *conn, project_id).await?;
        let children = ProjectRepo::reparent_children(&mut *conn, project_id, project.parent_id).await?;
        ProjectRepo::hard_delete(&mut *conn, project_id).await?;
        for child in &children {
            ProjectRepo::rebuild_subtree(&mut *conn, *child).await?;
        }
        tracing::debug!(project_id, children = children.len(), "Project removed from tree");
        Ok(())
    }

    /// Recompute stored paths below `project_id`.
    pub async fn rebuild_project_tree(&self, project_id: ProjectId) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let changed = ProjectRepo::rebuild_subtree(&mut *tx, project_id).await?;
        tx.commit().await?;
        tracing::debug!(project_id, changed, "Project subtree rebuilt");
        Ok(changed)
    }

    /// Recompute stored paths of every project.
    pub async fn rebuild_all_trees(&self) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let changed = ProjectRepo::rebuild_all(&mut *tx).await?;
        tx.commit().await?;
        tracing::debug!(changed, "All project trees rebuilt");
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Role assignments
    // -----------------------------------------------------------------------

    /// Give `member_id` a role on a project, replacing any previous role.
    pub async fn assign_role(
        &self,
        actor_id: ActorId,
        project_id: ProjectId,
        member_id: ActorId,
        role_name: &str,
    ) -> DbResult<RoleAssignment> {
        let mut tx = self.pool.begin().await?;
        let current = self.lock_membership(&mut tx, actor_id, project_id).await?;
        load_actor(&mut *tx, member_id).await?;
        let role = RoleRepo::find_by_name(&mut *tx, role_name)
            .await?
            .ok_or_else(|| CoreError::validation("role", format!("Unknown role '{role_name}'")))?;

        let change = AssignmentChange::Assign {
            actor_id: member_id,
            role: role.name.clone(),
        };
        membership::ensure_manager_remains(&current, &change, &self.config().manager_role)?;
        let assignment = AssignmentRepo::upsert(&mut *tx, project_id, member_id, role.id).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            project_id,
            member_id,
            role = %role.name,
            "Project role assigned"
        );
        Ok(assignment)
    }

    /// Remove `member_id` from a project. Returns `false` if not a member.
    pub async fn unassign_role(
        &self,
        actor_id: ActorId,
        project_id: ProjectId,
        member_id: ActorId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let current = self.lock_membership(&mut tx, actor_id, project_id).await?;
        let change = AssignmentChange::Remove {
            actor_id: member_id,
        };
        membership::ensure_manager_remains(&current, &change, &self.config().manager_role)?;
        let removed = AssignmentRepo::delete(&mut *tx, project_id, member_id).await?;
        tx.commit().await?;

        tracing::info!(actor_id, project_id, member_id, removed, "Project role removed");
        Ok(removed)
    }

    /// Members of a project the actor may view.
    pub async fn project_members(
        &self,
        actor_id: ActorId,
        project_id: ProjectId,
    ) -> DbResult<Vec<RoleAssignment>> {
        let mut tx = self.pool.begin().await?;
        let project = lock_project(&mut tx, project_id).await?;
        self.authorize(&mut tx, actor_id, project.state(), Operation::View)
            .await?;
        let members = AssignmentRepo::list_for_project(&mut *tx, project_id).await?;
        tx.commit().await?;
        Ok(members)
    }

    /// Require `change_project` on the project, then row-lock and return its
    /// live assignment set.
    async fn lock_membership(
        &self,
        conn: &mut PgConnection,
        actor_id: ActorId,
        project_id: ProjectId,
    ) -> DbResult<Vec<MemberRole>> {
        let project = lock_project(&mut *conn, project_id).await?;
        self.authorize(
            &mut *conn,
            actor_id,
            project.state(),
            Operation::Edit(EditKind::Fields),
        )
        .await?;
        let rows = AssignmentRepo::list_for_project_for_update(conn, project_id).await?;
        Ok(rows.iter().map(RoleAssignment::member_role).collect())
    }
}

/// Row-lock a prospective parent; trashed projects cannot take children.
async fn ensure_parent_usable(conn: &mut PgConnection, parent_id: ProjectId) -> DbResult<Project> {
    let parent = lock_project(conn, parent_id).await?;
    if parent.deleted {
        return Err(CoreError::validation(
            "parent_project",
            format!("Project {parent_id} is in the trash"),
        )
        .into());
    }
    Ok(parent)
}
