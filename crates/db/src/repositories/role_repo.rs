//! Repository for `roles` and `role_permissions`.

use sqlx::PgConnection;
use workbench_core::types::DbId;

use crate::models::role::Role;

/// Column list for the `roles` table.
const COLUMNS: &str = "id, name, created_at";

/// Provides read access to project roles.
pub struct RoleRepo;

impl RoleRepo {
    /// List all roles ordered by name.
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Role>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM roles ORDER BY name");
        sqlx::query_as::<_, Role>(&query).fetch_all(conn).await
    }

    /// Find a role by its unique name.
    pub async fn find_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Role>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM roles WHERE name = $1");
        sqlx::query_as::<_, Role>(&query)
            .bind(name)
            .fetch_optional(conn)
            .await
    }

    /// Permission codenames bundled with a role, sorted.
    pub async fn permissions(conn: &mut PgConnection, role_id: DbId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT codename FROM role_permissions WHERE role_id = $1 ORDER BY codename",
        )
        .bind(role_id)
        .fetch_all(conn)
        .await
    }
}
