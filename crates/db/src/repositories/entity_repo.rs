//! Repository for `entities` and their project / assignee links.

use sqlx::PgConnection;
use workbench_core::types::{ActorId, DbId, ProjectId};

use crate::models::entity::{CreateEntity, EditEntity, Entity};

/// Column list for the `entities` table.
const COLUMNS: &str = "id, entity_type, title, description, directory_id, deleted, created_by, version, is_dss, \
    imported, dss_container_id, created_at, updated_at";

/// Provides entity CRUD and association management.
pub struct EntityRepo;

impl EntityRepo {
    /// Insert a new entity with its project links and assignees.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateEntity,
        created_by: ActorId,
        imported: bool,
    ) -> Result<Entity, sqlx::Error> {
        let query = format!(
            "INSERT INTO entities \
                (entity_type, title, created_by, is_dss, imported, dss_container_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let entity = sqlx::query_as::<_, Entity>(&query)
            .bind(input.entity_type.codename())
            .bind(&input.title)
            .bind(created_by)
            .bind(input.dss_container_id.is_some())
            .bind(imported)
            .bind(input.dss_container_id)
            .fetch_one(&mut *conn)
            .await?;

        for &project_id in &input.project_ids {
            Self::add_project(&mut *conn, entity.id, project_id).await?;
        }
        for &actor_id in &input.assignee_ids {
            Self::add_assignee(&mut *conn, entity.id, actor_id).await?;
        }

        Ok(entity)
    }

    /// Find an entity by ID, trashed or not.
    pub async fn find_by_id(conn: &mut PgConnection, id: DbId) -> Result<Option<Entity>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM entities WHERE id = $1");
        sqlx::query_as::<_, Entity>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Find an entity by ID and lock its row until the transaction ends.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Entity>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM entities WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Entity>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Write the title, description and directory of `input` and bump the
    /// audit version. The DSS flag and container are never written here.
    pub async fn update(
        conn: &mut PgConnection,
        id: DbId,
        input: &EditEntity,
    ) -> Result<Option<Entity>, sqlx::Error> {
        let query = format!(
            "UPDATE entities SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                directory_id = CASE WHEN $4 THEN $5 ELSE directory_id END, \
                version = version + 1, \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Entity>(&query)
            .bind(id)
            .bind(input.title.as_deref())
            .bind(input.description.as_deref())
            .bind(input.directory_id.is_some())
            .bind(input.directory_id.flatten())
            .fetch_optional(conn)
            .await
    }

    /// IDs of a directory and every directory above it.
    pub async fn directory_chain(
        conn: &mut PgConnection,
        directory_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "WITH RECURSIVE chain(id, directory_id) AS ( \
                SELECT id, directory_id FROM entities WHERE id = $1 \
                UNION \
                SELECT e.id, e.directory_id FROM entities e JOIN chain c ON e.id = c.directory_id \
             ) \
             SELECT id FROM chain",
        )
        .bind(directory_id)
        .fetch_all(conn)
        .await
    }

    /// Flip the `deleted` flag. Returns `false` if it already had that value.
    pub async fn set_deleted(
        conn: &mut PgConnection,
        id: DbId,
        deleted: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE entities SET deleted = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted <> $2",
        )
        .bind(id)
        .bind(deleted)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Permanently remove an entity row. Links cascade.
    pub async fn hard_delete(conn: &mut PgConnection, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Project links
    // -----------------------------------------------------------------------

    /// Projects the entity is linked to, sorted.
    pub async fn project_ids(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Vec<ProjectId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT project_id FROM entity_projects WHERE entity_id = $1 ORDER BY project_id",
        )
        .bind(id)
        .fetch_all(conn)
        .await
    }

    /// Link an entity to a project. Returns `false` if already linked.
    pub async fn add_project(
        conn: &mut PgConnection,
        id: DbId,
        project_id: ProjectId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO entity_projects (entity_id, project_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(project_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unlink an entity from a project. Returns `false` if not linked.
    pub async fn remove_project(
        conn: &mut PgConnection,
        id: DbId,
        project_id: ProjectId,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM entity_projects WHERE entity_id = $1 AND project_id = $2")
                .bind(id)
                .bind(project_id)
                .execute(conn)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Assignees
    // -----------------------------------------------------------------------

    /// Add an assignee. Returns `false` if already assigned.
    pub async fn add_assignee(
        conn: &mut PgConnection,
        id: DbId,
        actor_id: ActorId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO entity_assignees (entity_id, actor_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(actor_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove an assignee. Returns `false` if not assigned.
    pub async fn remove_assignee(
        conn: &mut PgConnection,
        id: DbId,
        actor_id: ActorId,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM entity_assignees WHERE entity_id = $1 AND actor_id = $2")
                .bind(id)
                .bind(actor_id)
                .execute(conn)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
