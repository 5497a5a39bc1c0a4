//! Trusted import sessions for the DSS import pipeline.

use sqlx::{Postgres, Transaction};
use workbench_core::entity::EntityRef;
use workbench_core::error::CoreError;
use workbench_core::privilege::PrivilegeOverride;
use workbench_core::trusted::TrustedContext;
use workbench_core::types::ActorId;

use super::snapshot::{load_actor, lock_state};
use super::Workbench;
use crate::error::DbResult;
use crate::models::entity::{CreateEntity, Entity};
use crate::models::privilege::PrivilegeRow;
use crate::repositories::PrivilegeRepo;

/// One import run: a transaction that carries a [`TrustedContext`].
///
/// Permission checks are skipped for entities created through the session;
/// lifecycle, lock and DSS policy still apply. Nothing is visible to other
/// transactions until [`ImportSession::commit`]; dropping the session rolls
/// the whole run back.
pub struct ImportSession<'a> {
    workbench: &'a Workbench,
    tx: Transaction<'static, Postgres>,
    trusted: TrustedContext,
}

impl<'a> ImportSession<'a> {
    /// Open a session acting as `import_actor`.
    pub async fn begin(
        workbench: &'a Workbench,
        import_actor: ActorId,
        reason: impl Into<String>,
    ) -> DbResult<Self> {
        let mut tx = workbench.pool.begin().await?;
        load_actor(&mut *tx, import_actor).await?;
        let trusted = TrustedContext::import(import_actor, reason);
        tracing::info!(
            actor_id = import_actor,
            reason = trusted.reason().unwrap_or_default(),
            "Import session started"
        );
        Ok(Self {
            workbench,
            tx,
            trusted,
        })
    }

    pub fn context(&self) -> &TrustedContext {
        &self.trusted
    }

    fn import_actor(&self) -> ActorId {
        self.trusted.import_actor().unwrap_or_default()
    }

    /// Create an entity flagged `imported`.
    pub async fn create_imported(&mut self, input: &CreateEntity) -> DbResult<Entity> {
        let actor_id = self.import_actor();
        self.workbench
            .create_entity_in(&mut self.tx, actor_id, input, &self.trusted)
            .await
    }

    /// Provision the protected curator row for `curator_id` on a DSS-backed
    /// entity.
    pub async fn grant_curator(
        &mut self,
        entity: EntityRef,
        curator_id: ActorId,
    ) -> DbResult<PrivilegeRow> {
        let state = lock_state(&mut *self.tx, entity).await?;
        if state.dss_attrs().is_none() {
            return Err(CoreError::validation(
                "is_dss",
                format!("{entity} is not stored in a DSS container"),
            )
            .into());
        }
        load_actor(&mut *self.tx, curator_id).await?;

        let row = PrivilegeOverride::curator(entity, curator_id, &self.workbench.config().curator_role);
        let stored = PrivilegeRepo::upsert(&mut *self.tx, &row).await?;
        tracing::debug!(
            entity_type = %entity.entity_type,
            entity_id = entity.id,
            curator_id,
            "Curator privileges granted"
        );
        Ok(stored)
    }

    /// Commit everything created in this session.
    pub async fn commit(self) -> DbResult<()> {
        let actor_id = self.import_actor();
        self.tx.commit().await?;
        tracing::info!(actor_id, "Import session committed");
        Ok(())
    }
}
