//! Privilege override rows.

use serde::Serialize;
use sqlx::FromRow;
use workbench_core::entity::EntityRef;
use workbench_core::error::CoreError;
use workbench_core::privilege::PrivilegeOverride;
use workbench_core::types::{ActorId, DbId, Timestamp};

/// A row from the `privilege_overrides` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PrivilegeRow {
    pub id: DbId,
    pub entity_type: String,
    pub entity_id: DbId,
    pub actor_id: ActorId,
    pub view_privilege: String,
    pub edit_privilege: String,
    pub delete_privilege: String,
    pub trash_privilege: String,
    pub restore_privilege: String,
    pub full_access_privilege: String,
    pub protected_role: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PrivilegeRow {
    pub fn to_core(&self) -> Result<PrivilegeOverride, CoreError> {
        Ok(PrivilegeOverride {
            entity: EntityRef::new(self.entity_type.parse()?, self.entity_id),
            actor_id: self.actor_id,
            view: self.view_privilege.parse()?,
            edit: self.edit_privilege.parse()?,
            delete: self.delete_privilege.parse()?,
            trash: self.trash_privilege.parse()?,
            restore: self.restore_privilege.parse()?,
            full_access: self.full_access_privilege.parse()?,
            protected_role: self.protected_role.clone(),
        })
    }
}
