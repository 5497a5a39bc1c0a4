//! Repository for `project_role_assignments`.

use sqlx::PgConnection;
use workbench_core::membership::RoleGrant;
use workbench_core::types::{ActorId, DbId, ProjectId};

use crate::models::role::RoleAssignment;

/// Column list for assignment queries joined with `roles r` as `a`.
const COLUMNS: &str = "a.id, a.project_id, a.actor_id, a.role_id, r.name AS role_name, \
    a.created_at, a.updated_at";

/// Provides role assignment operations.
pub struct AssignmentRepo;

impl AssignmentRepo {
    /// All assignments of a project.
    pub async fn list_for_project(
        conn: &mut PgConnection,
        project_id: ProjectId,
    ) -> Result<Vec<RoleAssignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM project_role_assignments a \
             JOIN roles r ON r.id = a.role_id \
             WHERE a.project_id = $1 ORDER BY a.actor_id"
        );
        sqlx::query_as::<_, RoleAssignment>(&query)
            .bind(project_id)
            .fetch_all(conn)
            .await
    }

    /// All assignments of a project, row-locked until the transaction ends.
    ///
    /// Concurrent assignment changes on the same project serialise here, so
    /// the manager invariant is checked against the live set.
    pub async fn list_for_project_for_update(
        conn: &mut PgConnection,
        project_id: ProjectId,
    ) -> Result<Vec<RoleAssignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM project_role_assignments a \
             JOIN roles r ON r.id = a.role_id \
             WHERE a.project_id = $1 ORDER BY a.actor_id \
             FOR UPDATE OF a"
        );
        sqlx::query_as::<_, RoleAssignment>(&query)
            .bind(project_id)
            .fetch_all(conn)
            .await
    }

    /// Insert or change an actor's role on a project.
    pub async fn upsert(
        conn: &mut PgConnection,
        project_id: ProjectId,
        actor_id: ActorId,
        role_id: DbId,
    ) -> Result<RoleAssignment, sqlx::Error> {
        let query = format!(
            "WITH a AS ( \
                INSERT INTO project_role_assignments (project_id, actor_id, role_id) \
                VALUES ($1, $2, $3) \
                ON CONFLICT (project_id, actor_id) \
                DO UPDATE SET role_id = EXCLUDED.role_id, updated_at = NOW() \
                RETURNING * \
             ) \
             SELECT {COLUMNS} FROM a JOIN roles r ON r.id = a.role_id"
        );
        sqlx::query_as::<_, RoleAssignment>(&query)
            .bind(project_id)
            .bind(actor_id)
            .bind(role_id)
            .fetch_one(conn)
            .await
    }

    /// Remove an actor from a project. Returns `false` if not assigned.
    pub async fn delete(
        conn: &mut PgConnection,
        project_id: ProjectId,
        actor_id: ActorId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM project_role_assignments WHERE project_id = $1 AND actor_id = $2",
        )
        .bind(project_id)
        .bind(actor_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The actor's role grants on the given projects, with each role's
    /// permission codenames.
    pub async fn grants_for_actor(
        conn: &mut PgConnection,
        actor_id: ActorId,
        project_ids: &[ProjectId],
    ) -> Result<Vec<RoleGrant>, sqlx::Error> {
        let rows: Vec<(ProjectId, String, Vec<String>)> = sqlx::query_as(
            "SELECT a.project_id, r.name, \
                COALESCE(array_agg(rp.codename) FILTER (WHERE rp.codename IS NOT NULL), '{}') \
             FROM project_role_assignments a \
             JOIN roles r ON r.id = a.role_id \
             LEFT JOIN role_permissions rp ON rp.role_id = r.id \
             WHERE a.actor_id = $1 AND a.project_id = ANY($2) \
             GROUP BY a.project_id, r.name",
        )
        .bind(actor_id)
        .bind(project_ids)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(project_id, role, permissions)| RoleGrant {
                project_id,
                actor_id,
                role,
                permissions,
            })
            .collect())
    }
}
