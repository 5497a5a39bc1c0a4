//! DSS container administration. Containers are not workbench entities, so
//! these commands check global catalog permissions directly.

use workbench_core::dss::ReadWriteSetting;
use workbench_core::error::CoreError;
use workbench_core::permissions::Actor;
use workbench_core::types::{ActorId, DbId};

use super::snapshot::load_actor;
use super::Workbench;
use crate::error::{DbError, DbResult};
use crate::models::dss::{CreateDssContainer, DssContainerRow};
use crate::repositories::DssContainerRepo;

impl Workbench {
    /// Register a container. Requires `add_dsscontainer`.
    pub async fn create_container(
        &self,
        actor_id: ActorId,
        input: &CreateDssContainer,
    ) -> DbResult<DssContainerRow> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        require(&actor, "add_dsscontainer")?;
        let container = DssContainerRepo::create(&mut *tx, input).await?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            container_id = container.id,
            read_write_setting = %input.read_write_setting,
            "DSS container created"
        );
        Ok(container)
    }

    /// Change a container's read/write mode. Requires `change_dsscontainer`.
    pub async fn set_container_setting(
        &self,
        actor_id: ActorId,
        container_id: DbId,
        setting: ReadWriteSetting,
    ) -> DbResult<DssContainerRow> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        require(&actor, "change_dsscontainer")?;
        let container = DssContainerRepo::set_read_write_setting(&mut *tx, container_id, setting)
            .await?
            .ok_or_else(|| DbError::not_found("dss_container", container_id))?;
        tx.commit().await?;

        tracing::info!(
            actor_id,
            container_id,
            read_write_setting = %setting,
            "DSS container setting changed"
        );
        Ok(container)
    }

    /// Delete a container together with the curator-protected overrides on
    /// its entities. Requires `delete_dsscontainer`.
    pub async fn delete_container(&self, actor_id: ActorId, container_id: DbId) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let actor = load_actor(&mut *tx, actor_id).await?;
        require(&actor, "delete_dsscontainer")?;
        let deleted =
            DssContainerRepo::delete(&mut *tx, container_id, &self.config().curator_role).await?;
        tx.commit().await?;

        tracing::info!(actor_id, container_id, deleted, "DSS container deleted");
        Ok(deleted)
    }
}

fn require(actor: &Actor, codename: &str) -> Result<(), CoreError> {
    if actor.is_superuser || actor.has_perm(codename) {
        return Ok(());
    }
    Err(CoreError::denied(format!("The '{codename}' permission is required")))
}
