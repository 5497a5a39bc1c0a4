//! Privilege override commands. Only owners (effective `full_access`) and
//! superusers manage overrides.

use workbench_core::engine::{AccessSnapshot, Operation};
use workbench_core::entity::EntityRef;
use workbench_core::error::CoreError;
use workbench_core::privilege::{self, PrivilegeAxis, PrivilegeOverride, PrivilegeValue};
use workbench_core::trusted::TrustedContext;
use workbench_core::types::ActorId;

use super::snapshot::{load_actor, load_snapshot, lock_state};
use super::Workbench;
use crate::error::{DbError, DbResult};
use crate::models::privilege::PrivilegeRow;
use crate::repositories::PrivilegeRepo;

impl Workbench {
    /// Insert or replace a full override row.
    ///
    /// Rows carrying a protected role can only be written by a superuser, and
    /// an existing curator row on a live DSS entity cannot be changed at all.
    pub async fn set_privilege(
        &self,
        actor_id: ActorId,
        row: &PrivilegeOverride,
    ) -> DbResult<PrivilegeRow> {
        let mut tx = self.pool.begin().await?;
        let snapshot = self.manage(&mut tx, actor_id, row.entity).await?;
        if row.protected_role.is_some() && !snapshot.actor.is_superuser {
            return Err(CoreError::validation(
                "protected_role",
                "Only superusers may assign protected roles",
            )
            .into());
        }
        self.ensure_mutable(&mut tx, &snapshot, row.actor_id).await?;

        let stored = PrivilegeRepo::upsert(&mut *tx, row).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %row.entity.entity_type,
            entity_id = row.entity.id,
            target_actor_id = row.actor_id,
            "Privilege override set"
        );
        Ok(stored)
    }

    /// Change one axis of `target_actor`'s row, creating a NEUTRAL row first
    /// if there is none.
    pub async fn set_privilege_axis(
        &self,
        actor_id: ActorId,
        entity: EntityRef,
        target_actor: ActorId,
        axis: PrivilegeAxis,
        value: PrivilegeValue,
    ) -> DbResult<PrivilegeRow> {
        let mut tx = self.pool.begin().await?;
        let snapshot = self.manage(&mut tx, actor_id, entity).await?;
        self.ensure_mutable(&mut tx, &snapshot, target_actor).await?;

        let mut row = match PrivilegeRepo::find(&mut *tx, entity, target_actor).await? {
            Some(existing) => existing.to_core()?,
            None => PrivilegeOverride::neutral(entity, target_actor),
        };
        row.set(axis, value);
        let stored = PrivilegeRepo::upsert(&mut *tx, &row).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id = entity.id,
            target_actor_id = target_actor,
            axis = ?axis,
            value = %value,
            "Privilege axis set"
        );
        Ok(stored)
    }

    /// Delete `target_actor`'s row. Returns `false` if there was none.
    pub async fn delete_privilege(
        &self,
        actor_id: ActorId,
        entity: EntityRef,
        target_actor: ActorId,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let snapshot = self.manage(&mut tx, actor_id, entity).await?;
        self.ensure_mutable(&mut tx, &snapshot, target_actor).await?;

        let deleted = PrivilegeRepo::delete(&mut *tx, entity, target_actor).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            entity_type = %entity.entity_type,
            entity_id = entity.id,
            target_actor_id = target_actor,
            deleted,
            "Privilege override deleted"
        );
        Ok(deleted)
    }

    /// Every override row on an entity the actor may view.
    pub async fn list_privileges(
        &self,
        actor_id: ActorId,
        entity: EntityRef,
    ) -> DbResult<Vec<PrivilegeRow>> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        let state = lock_state(&mut *tx, entity).await?;
        let snapshot = load_snapshot(&mut *tx, actor, state, &Operation::View).await?;
        self.decide(&snapshot, Operation::View, &TrustedContext::none())?;

        let rows = PrivilegeRepo::list_for_entity(&mut *tx, entity).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Lock the entity and require the right to manage its overrides.
    async fn manage(
        &self,
        conn: &mut sqlx::PgConnection,
        actor_id: ActorId,
        entity: EntityRef,
    ) -> DbResult<AccessSnapshot> {
        let actor = load_actor(&mut *conn, actor_id).await?;
        let state = lock_state(&mut *conn, entity).await?;
        let op = Operation::ManagePrivileges;
        let snapshot = load_snapshot(conn, actor, state, &op).await?;
        self.decide(&snapshot, op, &TrustedContext::none())?;
        Ok(snapshot)
    }

    /// Reject changes to a curator-protected row.
    async fn ensure_mutable(
        &self,
        conn: &mut sqlx::PgConnection,
        snapshot: &AccessSnapshot,
        target_actor: ActorId,
    ) -> DbResult<()> {
        let Some(existing) = PrivilegeRepo::find(conn, snapshot.entity.entity, target_actor).await?
        else {
            return Ok(());
        };
        privilege::ensure_override_mutable(
            &existing.to_core()?,
            &snapshot.entity,
            &self.config().curator_role,
        )
        .map_err(DbError::from)
    }
}
