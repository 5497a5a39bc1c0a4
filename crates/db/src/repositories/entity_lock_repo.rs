//! Repository for the `entity_locks` table.
//!
//! There is at most one row per entity. Rows are never swept; expiry is
//! computed from `acquired_at` by the caller.

use sqlx::PgConnection;
use workbench_core::entity::EntityRef;
use workbench_core::locking::LockRecord;

use crate::models::entity_lock::EntityLock;

/// Column list for the `entity_locks` table.
const COLUMNS: &str = "id, entity_type, entity_id, owner_id, acquired_at, webdav";

/// Provides lock row storage.
pub struct EntityLockRepo;

impl EntityLockRepo {
    /// Stored lock rows of an entity, active or expired.
    pub async fn for_entity(
        conn: &mut PgConnection,
        entity: EntityRef,
    ) -> Result<Vec<EntityLock>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM entity_locks \
             WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY acquired_at DESC"
        );
        sqlx::query_as::<_, EntityLock>(&query)
            .bind(entity.entity_type.codename())
            .bind(entity.id)
            .fetch_all(conn)
            .await
    }

    /// Write `record` as the entity's only lock row, superseding any
    /// previous row.
    pub async fn upsert(
        conn: &mut PgConnection,
        record: &LockRecord,
    ) -> Result<EntityLock, sqlx::Error> {
        let query = format!(
            "INSERT INTO entity_locks (entity_type, entity_id, owner_id, acquired_at, webdav) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (entity_type, entity_id) DO UPDATE SET \
                owner_id = EXCLUDED.owner_id, \
                acquired_at = EXCLUDED.acquired_at, \
                webdav = EXCLUDED.webdav \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EntityLock>(&query)
            .bind(record.entity.entity_type.codename())
            .bind(record.entity.id)
            .bind(record.owner_id)
            .bind(record.acquired_at)
            .bind(record.webdav)
            .fetch_one(conn)
            .await
    }

    /// Delete the entity's lock rows. Returns the number removed.
    pub async fn delete_for_entity(
        conn: &mut PgConnection,
        entity: EntityRef,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM entity_locks WHERE entity_type = $1 AND entity_id = $2")
                .bind(entity.entity_type.codename())
                .bind(entity.id)
                .execute(conn)
                .await?;
        Ok(result.rows_affected())
    }
}
