//! Repository for the `dss_containers` table.

use sqlx::PgConnection;
use workbench_core::dss::ReadWriteSetting;
use workbench_core::types::DbId;

use crate::models::dss::{CreateDssContainer, DssContainerRow};
use crate::repositories::PrivilegeRepo;

/// Column list for the `dss_containers` table.
const COLUMNS: &str = "id, path, read_write_setting, created_at, updated_at";

/// Provides DSS container CRUD.
pub struct DssContainerRepo;

impl DssContainerRepo {
    /// Register a new container.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateDssContainer,
    ) -> Result<DssContainerRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO dss_containers (path, read_write_setting) VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DssContainerRow>(&query)
            .bind(&input.path)
            .bind(input.read_write_setting.as_str())
            .fetch_one(conn)
            .await
    }

    /// Find a container by ID.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<DssContainerRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM dss_containers WHERE id = $1");
        sqlx::query_as::<_, DssContainerRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Change the container's read/write mode.
    pub async fn set_read_write_setting(
        conn: &mut PgConnection,
        id: DbId,
        setting: ReadWriteSetting,
    ) -> Result<Option<DssContainerRow>, sqlx::Error> {
        let query = format!(
            "UPDATE dss_containers SET read_write_setting = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DssContainerRow>(&query)
            .bind(id)
            .bind(setting.as_str())
            .fetch_optional(conn)
            .await
    }

    /// Delete a container, first removing the overrides protected by
    /// `curator_role` on every entity it holds.
    ///
    /// Must run inside a transaction so both deletes commit together.
    /// Returns `false` if the container did not exist.
    pub async fn delete(
        conn: &mut PgConnection,
        id: DbId,
        curator_role: &str,
    ) -> Result<bool, sqlx::Error> {
        PrivilegeRepo::delete_protected_in_container(&mut *conn, id, curator_role).await?;
        let result = sqlx::query("DELETE FROM dss_containers WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
