//! Advisory lock commands.
//!
//! Acquisition is a compare-and-set under the target's row lock: two
//! concurrent acquirers serialise on `SELECT ... FOR UPDATE` and the second
//! one sees the first one's row.

use sqlx::PgConnection;
use workbench_core::engine::Operation;
use workbench_core::entity::EntityRef;
use workbench_core::locking::{self, LockRecord};
use workbench_core::trusted::TrustedContext;
use workbench_core::types::ActorId;

use super::snapshot::{load_actor, load_snapshot, lock_state};
use super::{now, Workbench};
use crate::error::{DbError, DbResult};
use crate::models::entity_lock::LockStatus;
use crate::repositories::EntityLockRepo;

impl Workbench {
    /// Acquire (or refresh) the lock on an entity the actor may view.
    pub async fn acquire_lock(
        &self,
        actor_id: ActorId,
        entity: EntityRef,
        webdav: bool,
    ) -> DbResult<LockStatus> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        let state = lock_state(&mut *tx, entity).await?;
        let snapshot = load_snapshot(&mut *tx, actor, state, &Operation::View).await?;
        self.decide(&snapshot, Operation::View, &TrustedContext::none())?;

        let ttl = &self.config().locks;
        let record = locking::plan_acquire(
            &snapshot.entity,
            &snapshot.locks,
            actor_id,
            webdav,
            now(),
            ttl,
        )
        .map_err(|err| {
            tracing::warn!(
                actor_id,
                entity_type = %entity.entity_type,
                entity_id = entity.id,
                error = %err,
                "Lock acquisition rejected"
            );
            DbError::from(err)
        })?;
        EntityLockRepo::upsert(&mut *tx, &record).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id = entity.id,
            webdav,
            "Lock acquired"
        );
        Ok(LockStatus::from_record(&record, ttl))
    }

    /// Release the entity's lock.
    ///
    /// Owners release their own lock, anyone may clear an expired one, and a
    /// superuser may break any lock. Returns `false` when there was nothing
    /// to release.
    pub async fn release_lock(&self, actor_id: ActorId, entity: EntityRef) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        lock_state(&mut *tx, entity).await?;
        let locks = load_records(&mut tx, entity).await?;

        locking::check_release(&locks, &actor, now(), &self.config().locks)?;
        let released = EntityLockRepo::delete_for_entity(&mut *tx, entity).await? > 0;
        tx.commit().await?;

        if released {
            tracing::info!(
                actor_id,
                entity_type = %entity.entity_type,
                entity_id = entity.id,
                "Lock released"
            );
        }
        Ok(released)
    }

    /// The active lock on an entity, if any.
    pub async fn lock_status(&self, entity: EntityRef) -> DbResult<Option<LockStatus>> {
        let mut conn = self.pool.acquire().await?;
        let locks = load_records(&mut conn, entity).await?;
        let ttl = &self.config().locks;
        Ok(locking::active_lock(&locks, now(), ttl).map(|l| LockStatus::from_record(l, ttl)))
    }

    /// `true` iff someone other than `actor_id` holds an active lock.
    pub async fn is_locked_by_other(&self, actor_id: ActorId, entity: EntityRef) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let locks = load_records(&mut conn, entity).await?;
        Ok(locking::is_locked_by_other(
            &locks,
            actor_id,
            now(),
            &self.config().locks,
        ))
    }
}

async fn load_records(conn: &mut PgConnection, entity: EntityRef) -> DbResult<Vec<LockRecord>> {
    EntityLockRepo::for_entity(conn, entity)
        .await?
        .iter()
        .map(|row| row.to_record().map_err(DbError::from))
        .collect()
}
