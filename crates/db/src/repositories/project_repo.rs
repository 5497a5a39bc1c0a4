//! Repository for the `projects` table and its materialised tree.

use sqlx::PgConnection;
use workbench_core::membership::{self, ProjectNode, TreePosition};
use workbench_core::types::{ActorId, ProjectId};

use crate::models::project::{CreateProject, Project};

/// Column list for the `projects` table.
const COLUMNS: &str = "id, name, parent_id, path, depth, deleted, created_by, \
    created_at, updated_at";

/// Provides project CRUD and tree maintenance.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project below `input.parent_id`, deriving `path` and
    /// `depth` from the parent's stored position.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateProject,
        created_by: ActorId,
    ) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (name, parent_id, path, depth, created_by) \
             VALUES ($1, $2, \
                COALESCE((SELECT path || id FROM projects WHERE id = $2), '{{}}'), \
                COALESCE((SELECT depth + 1 FROM projects WHERE id = $2), 0), \
                $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(&input.name)
            .bind(input.parent_id)
            .bind(created_by)
            .fetch_one(conn)
            .await
    }

    /// Find a project by ID, trashed or not.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: ProjectId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Find a project by ID and lock its row until the transaction ends.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: ProjectId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Flip the `deleted` flag. Returns `false` if it already had that value.
    pub async fn set_deleted(
        conn: &mut PgConnection,
        id: ProjectId,
        deleted: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET deleted = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted <> $2",
        )
        .bind(id)
        .bind(deleted)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point a project at a new parent. Positions are stale until the
    /// subtree is rebuilt.
    pub async fn set_parent(
        conn: &mut PgConnection,
        id: ProjectId,
        parent_id: Option<ProjectId>,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE projects SET parent_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(parent_id)
                .execute(conn)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move every child of `id` to `new_parent`. Returns the moved IDs.
    pub async fn reparent_children(
        conn: &mut PgConnection,
        id: ProjectId,
        new_parent: Option<ProjectId>,
    ) -> Result<Vec<ProjectId>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE projects SET parent_id = $2, updated_at = NOW() \
             WHERE parent_id = $1 \
             RETURNING id",
        )
        .bind(id)
        .bind(new_parent)
        .fetch_all(conn)
        .await
    }

    /// Permanently remove a project row.
    pub async fn hard_delete(conn: &mut PgConnection, id: ProjectId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs of every root project.
    pub async fn root_ids(conn: &mut PgConnection) -> Result<Vec<ProjectId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM projects WHERE parent_id IS NULL ORDER BY id")
            .fetch_all(conn)
            .await
    }

    // -----------------------------------------------------------------------
    // Tree maintenance
    // -----------------------------------------------------------------------

    /// Recompute `path` and `depth` for `root` and all of its descendants,
    /// following `parent_id` rather than the possibly stale stored paths.
    ///
    /// Idempotent. Returns the number of rows whose position changed.
    pub async fn rebuild_subtree(
        conn: &mut PgConnection,
        root: ProjectId,
    ) -> Result<u64, sqlx::Error> {
        let root_parent: Option<Option<ProjectId>> =
            sqlx::query_scalar("SELECT parent_id FROM projects WHERE id = $1")
                .bind(root)
                .fetch_optional(&mut *conn)
                .await?;
        let Some(root_parent) = root_parent else {
            return Ok(0);
        };

        let root_path = match root_parent {
            Some(parent) => {
                let parent_path: Option<Vec<ProjectId>> =
                    sqlx::query_scalar("SELECT path FROM projects WHERE id = $1")
                        .bind(parent)
                        .fetch_optional(&mut *conn)
                        .await?;
                let mut path = parent_path.unwrap_or_default();
                path.push(parent);
                path
            }
            None => Vec::new(),
        };

        let nodes = Self::subtree_nodes(&mut *conn, root).await?;
        let positions = membership::rebuild_subtree(root, &root_path, &nodes);
        Self::update_positions(conn, &positions).await
    }

    /// Rebuild every tree. Returns the number of rows whose position changed.
    pub async fn rebuild_all(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
        let mut changed = 0;
        for root in Self::root_ids(&mut *conn).await? {
            changed += Self::rebuild_subtree(&mut *conn, root).await?;
        }
        Ok(changed)
    }

    /// `root` and its descendants by `parent_id`. `UNION` stops on cycles.
    async fn subtree_nodes(
        conn: &mut PgConnection,
        root: ProjectId,
    ) -> Result<Vec<ProjectNode>, sqlx::Error> {
        let rows: Vec<(ProjectId, Option<ProjectId>)> = sqlx::query_as(
            "WITH RECURSIVE subtree(id, parent_id) AS ( \
                SELECT id, parent_id FROM projects WHERE id = $1 \
                UNION \
                SELECT p.id, p.parent_id FROM projects p \
                JOIN subtree s ON p.parent_id = s.id \
             ) \
             SELECT id, parent_id FROM subtree",
        )
        .bind(root)
        .fetch_all(conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, parent_id)| ProjectNode { id, parent_id })
            .collect())
    }

    async fn update_positions(
        conn: &mut PgConnection,
        positions: &[TreePosition],
    ) -> Result<u64, sqlx::Error> {
        let mut changed = 0;
        for position in positions {
            let result = sqlx::query(
                "UPDATE projects SET path = $2, depth = $3 \
                 WHERE id = $1 AND (path <> $2 OR depth <> $3)",
            )
            .bind(position.id)
            .bind(&position.path)
            .bind(position.depth)
            .execute(&mut *conn)
            .await?;
            changed += result.rows_affected();
        }
        Ok(changed)
    }
}
