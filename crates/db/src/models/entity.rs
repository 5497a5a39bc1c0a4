//! Workbench entity rows (every type except projects).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use workbench_core::entity::{EditKind, EntityRef, EntityState, EntityType};
use workbench_core::error::CoreError;
use workbench_core::types::{ActorId, DbId, ProjectId, Timestamp};

/// A row from the `entities` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Entity {
    pub id: DbId,
    pub entity_type: String,
    pub title: String,
    /// Descriptive metadata. Changing it never counts as a content edit.
    pub description: String,
    /// Parent directory or drive, `None` at the top level.
    pub directory_id: Option<DbId>,
    pub deleted: bool,
    pub created_by: ActorId,
    /// Audit counter, bumped on every committed edit.
    pub version: i64,
    pub is_dss: bool,
    pub imported: bool,
    pub dss_container_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Entity {
    pub fn kind(&self) -> Result<EntityType, CoreError> {
        self.entity_type.parse()
    }

    pub fn entity_ref(&self) -> Result<EntityRef, CoreError> {
        Ok(EntityRef::new(self.kind()?, self.id))
    }

    /// Engine view of the entity given its project links.
    pub fn state(&self, project_ids: Vec<ProjectId>) -> Result<EntityState, CoreError> {
        let mut state =
            EntityState::new(self.entity_ref()?, self.created_by).with_projects(project_ids);
        if let (true, Some(container_id)) = (self.is_dss, self.dss_container_id) {
            state = state.with_dss(container_id, self.imported);
        }
        if self.deleted {
            state = state.trashed();
        }
        Ok(state)
    }
}

/// DTO for creating an entity.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntity {
    pub entity_type: EntityType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project_ids: Vec<ProjectId>,
    /// Initial assignees (tasks) or attendees (meetings).
    #[serde(default)]
    pub assignee_ids: Vec<ActorId>,
    /// Container the entity is created in, for DSS-backed storage entities.
    pub dss_container_id: Option<DbId>,
}

impl CreateEntity {
    pub fn new(entity_type: EntityType, title: impl Into<String>) -> Self {
        Self {
            entity_type,
            title: title.into(),
            project_ids: Vec::new(),
            assignee_ids: Vec::new(),
            dss_container_id: None,
        }
    }

    pub fn in_projects(mut self, project_ids: impl IntoIterator<Item = ProjectId>) -> Self {
        self.project_ids = project_ids.into_iter().collect();
        self
    }

    pub fn with_assignees(mut self, assignee_ids: impl IntoIterator<Item = ActorId>) -> Self {
        self.assignee_ids = assignee_ids.into_iter().collect();
        self
    }

    pub fn in_container(mut self, container_id: DbId) -> Self {
        self.dss_container_id = Some(container_id);
        self
    }

    /// Engine view of the entity about to be created.
    pub fn state(&self, creator: ActorId, imported: bool) -> EntityState {
        let state = EntityState::new(EntityRef::new(self.entity_type, 0), creator)
            .with_projects(self.project_ids.iter().copied());
        match self.dss_container_id {
            Some(container_id) => state.with_dss(container_id, imported),
            None => state,
        }
    }
}

/// Input for an edit. Only the fields that are `Some` are written.
///
/// The edit kinds the DSS policy sees are derived from the difference
/// between this input and the stored row, see [`EditEntity::kinds`].
#[derive(Debug, Clone, Default)]
pub struct EditEntity {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Target directory or drive; `Some(None)` moves to the top level.
    pub directory_id: Option<Option<DbId>>,
    /// Requested value of the DSS flag, which never changes after creation.
    pub is_dss: Option<bool>,
}

impl EditEntity {
    pub fn fields(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn metadata(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn move_to(directory_id: Option<DbId>) -> Self {
        Self {
            directory_id: Some(directory_id),
            ..Self::default()
        }
    }

    pub fn dss_flag(is_dss: bool) -> Self {
        Self {
            is_dss: Some(is_dss),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The kinds of change this input performs on `row`, most restrictive
    /// first. `target_container` is the container of the target directory
    /// and is only read when the directory actually changes. Empty when the
    /// input matches the row.
    pub fn kinds(&self, row: &Entity, target_container: Option<DbId>) -> Vec<EditKind> {
        let mut kinds = Vec::new();
        if self.is_dss.is_some_and(|flag| flag != row.is_dss) {
            kinds.push(EditKind::ToggleDssFlag);
        }
        if self.directory_id.is_some_and(|dir| dir != row.directory_id) {
            kinds.push(EditKind::Move { target_container });
        }
        if self.title.as_ref().is_some_and(|t| *t != row.title) {
            kinds.push(EditKind::Fields);
        }
        if self.description.as_ref().is_some_and(|d| *d != row.description) {
            kinds.push(EditKind::MetadataOnly);
        }
        kinds
    }
}
