//! Repository for `privilege_overrides`.

use sqlx::PgConnection;
use workbench_core::entity::EntityRef;
use workbench_core::privilege::PrivilegeOverride;
use workbench_core::types::{ActorId, DbId};

use crate::models::privilege::PrivilegeRow;

/// Column list for the `privilege_overrides` table.
const COLUMNS: &str = "id, entity_type, entity_id, actor_id, view_privilege, edit_privilege, \
    delete_privilege, trash_privilege, restore_privilege, full_access_privilege, \
    protected_role, created_at, updated_at";

/// Provides override row storage keyed by `(entity, actor)`.
pub struct PrivilegeRepo;

impl PrivilegeRepo {
    /// The actor's override row on an entity, if any.
    pub async fn find(
        conn: &mut PgConnection,
        entity: EntityRef,
        actor_id: ActorId,
    ) -> Result<Option<PrivilegeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM privilege_overrides \
             WHERE entity_type = $1 AND entity_id = $2 AND actor_id = $3"
        );
        sqlx::query_as::<_, PrivilegeRow>(&query)
            .bind(entity.entity_type.codename())
            .bind(entity.id)
            .bind(actor_id)
            .fetch_optional(conn)
            .await
    }

    /// Every override row on an entity, ordered by actor.
    pub async fn list_for_entity(
        conn: &mut PgConnection,
        entity: EntityRef,
    ) -> Result<Vec<PrivilegeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM privilege_overrides \
             WHERE entity_type = $1 AND entity_id = $2 ORDER BY actor_id"
        );
        sqlx::query_as::<_, PrivilegeRow>(&query)
            .bind(entity.entity_type.codename())
            .bind(entity.id)
            .fetch_all(conn)
            .await
    }

    /// Insert or replace a full override row.
    pub async fn upsert(
        conn: &mut PgConnection,
        row: &PrivilegeOverride,
    ) -> Result<PrivilegeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO privilege_overrides \
                (entity_type, entity_id, actor_id, view_privilege, edit_privilege, \
                 delete_privilege, trash_privilege, restore_privilege, \
                 full_access_privilege, protected_role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (entity_type, entity_id, actor_id) DO UPDATE SET \
                view_privilege = EXCLUDED.view_privilege, \
                edit_privilege = EXCLUDED.edit_privilege, \
                delete_privilege = EXCLUDED.delete_privilege, \
                trash_privilege = EXCLUDED.trash_privilege, \
                restore_privilege = EXCLUDED.restore_privilege, \
                full_access_privilege = EXCLUDED.full_access_privilege, \
                protected_role = EXCLUDED.protected_role, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PrivilegeRow>(&query)
            .bind(row.entity.entity_type.codename())
            .bind(row.entity.id)
            .bind(row.actor_id)
            .bind(row.view.as_str())
            .bind(row.edit.as_str())
            .bind(row.delete.as_str())
            .bind(row.trash.as_str())
            .bind(row.restore.as_str())
            .bind(row.full_access.as_str())
            .bind(&row.protected_role)
            .fetch_one(conn)
            .await
    }

    /// Set `view` and `edit` to ALLOW, keeping every other axis of an
    /// existing row.
    pub async fn grant_participant(
        conn: &mut PgConnection,
        entity: EntityRef,
        actor_id: ActorId,
    ) -> Result<PrivilegeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO privilege_overrides \
                (entity_type, entity_id, actor_id, view_privilege, edit_privilege) \
             VALUES ($1, $2, $3, 'ALLOW', 'ALLOW') \
             ON CONFLICT (entity_type, entity_id, actor_id) DO UPDATE SET \
                view_privilege = 'ALLOW', edit_privilege = 'ALLOW', updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PrivilegeRow>(&query)
            .bind(entity.entity_type.codename())
            .bind(entity.id)
            .bind(actor_id)
            .fetch_one(conn)
            .await
    }

    /// Delete one override row. Returns `false` if there was none.
    pub async fn delete(
        conn: &mut PgConnection,
        entity: EntityRef,
        actor_id: ActorId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM privilege_overrides \
             WHERE entity_type = $1 AND entity_id = $2 AND actor_id = $3",
        )
        .bind(entity.entity_type.codename())
        .bind(entity.id)
        .bind(actor_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every override row on an entity.
    pub async fn delete_for_entity(
        conn: &mut PgConnection,
        entity: EntityRef,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM privilege_overrides WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity.entity_type.codename())
        .bind(entity.id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete the rows protected by `role` on every entity of a container.
    pub async fn delete_protected_in_container(
        conn: &mut PgConnection,
        container_id: DbId,
        role: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM privilege_overrides po USING entities e \
             WHERE po.entity_type = e.entity_type AND po.entity_id = e.id \
               AND e.dss_container_id = $1 AND po.protected_role = $2",
        )
        .bind(container_id)
        .bind(role)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
