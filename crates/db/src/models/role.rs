//! Project roles and role assignments.

use serde::Serialize;
use sqlx::FromRow;
use workbench_core::membership::MemberRole;
use workbench_core::types::{ActorId, DbId, ProjectId, Timestamp};

/// A row from the `roles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

/// A `project_role_assignments` row joined with its role name.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoleAssignment {
    pub id: DbId,
    pub project_id: ProjectId,
    pub actor_id: ActorId,
    pub role_id: DbId,
    pub role_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RoleAssignment {
    pub fn member_role(&self) -> MemberRole {
        MemberRole {
            actor_id: self.actor_id,
            role: self.role_name.clone(),
        }
    }
}
