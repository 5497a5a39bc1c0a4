//! Project rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use workbench_core::entity::{EntityRef, EntityState, EntityType};
use workbench_core::types::{ActorId, ProjectId, Timestamp};

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub parent_id: Option<ProjectId>,
    /// Ancestor ids, root first.
    pub path: Vec<ProjectId>,
    pub depth: i32,
    pub deleted: bool,
    pub created_by: ActorId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityType::Project, self.id)
    }

    /// Engine view of the project. Roles on the project itself apply to it.
    pub fn state(&self) -> EntityState {
        let state = EntityState::new(self.entity_ref(), self.created_by).with_projects([self.id]);
        if self.deleted {
            state.trashed()
        } else {
            state
        }
    }
}

/// DTO for creating a project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub parent_id: Option<ProjectId>,
}
