//! Workbench entity types, their capability tags, and the entity state the
//! engine evaluates.
//!
//! Each [`EntityType`] declares a fixed capability set; the decision engine
//! only runs the clauses that match the capabilities of the entity at hand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ActorId, DbId, ProjectId};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Behaviour an entity type opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Edits are guarded by the advisory lock manager.
    Lockable,
    /// May be associated with projects; project roles apply.
    ProjectScoped,
    /// Goes through the trash before it can be hard-deleted.
    SoftDeletable,
    /// May live inside a DSS container whose policy narrows decisions.
    DssOverridable,
    /// Has assignees (tasks) or attendees (meetings) that receive overrides.
    HasAssignees,
}

use Capability::*;

const PROJECT_CAPS: &[Capability] = &[ProjectScoped, SoftDeletable];
const CONTENT_CAPS: &[Capability] = &[Lockable, ProjectScoped, SoftDeletable];
const PARTICIPANT_CAPS: &[Capability] = &[Lockable, ProjectScoped, SoftDeletable, HasAssignees];
const STORAGE_CAPS: &[Capability] = &[Lockable, ProjectScoped, SoftDeletable, DssOverridable];
const DIRECTORY_CAPS: &[Capability] = &[ProjectScoped, DssOverridable];

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// The closed set of workbench entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "task")]
    Task,
    #[serde(rename = "note")]
    Note,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "meeting")]
    Meeting,
    #[serde(rename = "contact")]
    Contact,
    #[serde(rename = "labbook")]
    LabBook,
    #[serde(rename = "dmp")]
    Dmp,
    #[serde(rename = "drive")]
    Drive,
    #[serde(rename = "directory")]
    Directory,
    #[serde(rename = "resource")]
    Resource,
    #[serde(rename = "picture")]
    Picture,
    #[serde(rename = "kanbanboard")]
    KanbanBoard,
}

impl EntityType {
    pub const ALL: &'static [EntityType] = &[
        EntityType::Project,
        EntityType::Task,
        EntityType::Note,
        EntityType::File,
        EntityType::Meeting,
        EntityType::Contact,
        EntityType::LabBook,
        EntityType::Dmp,
        EntityType::Drive,
        EntityType::Directory,
        EntityType::Resource,
        EntityType::Picture,
        EntityType::KanbanBoard,
    ];

    /// Stable codename used in permission keys and the `entity_type` columns.
    pub fn codename(self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Task => "task",
            EntityType::Note => "note",
            EntityType::File => "file",
            EntityType::Meeting => "meeting",
            EntityType::Contact => "contact",
            EntityType::LabBook => "labbook",
            EntityType::Dmp => "dmp",
            EntityType::Drive => "drive",
            EntityType::Directory => "directory",
            EntityType::Resource => "resource",
            EntityType::Picture => "picture",
            EntityType::KanbanBoard => "kanbanboard",
        }
    }

    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            EntityType::Project => PROJECT_CAPS,
            EntityType::Task | EntityType::Meeting => PARTICIPANT_CAPS,
            EntityType::File | EntityType::Drive => STORAGE_CAPS,
            EntityType::Directory => DIRECTORY_CAPS,
            EntityType::Note
            | EntityType::Contact
            | EntityType::LabBook
            | EntityType::Dmp
            | EntityType::Resource
            | EntityType::Picture
            | EntityType::KanbanBoard => CONTENT_CAPS,
        }
    }

    pub fn has(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.codename() == s)
            .ok_or_else(|| {
                CoreError::validation("entity_type", format!("Unknown entity type '{s}'"))
            })
    }
}

// ---------------------------------------------------------------------------
// EntityRef / EntityState
// ---------------------------------------------------------------------------

/// Key of an entity: `(entity_type, entity_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: DbId,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: DbId) -> Self {
        Self { entity_type, id }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.entity_type.has(capability)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.entity_type, self.id)
    }
}

/// DSS attributes of an entity flagged `is_dss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssAttrs {
    pub container_id: DbId,
    /// `true` when the row was created by the DSS import pipeline.
    pub imported: bool,
}

/// What an edit touches. DSS containers treat each kind differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditKind {
    /// Metadata fields only (custom metadata, labels).
    MetadataOnly,
    /// Regular content fields.
    Fields,
    /// Move into a directory/drive that belongs to `target_container`
    /// (`None` for a non-DSS target).
    Move { target_container: Option<DbId> },
    /// Attempt to flip the `is_dss` flag.
    ToggleDssFlag,
}

/// The state of an entity as seen by the engine.
///
/// For a new entity (`Create`), `entity.id` is `0` and `project_ids` holds the
/// projects the caller intends to associate. For a [`EntityType::Project`],
/// `project_ids` holds the project itself so that roles on the project apply.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub entity: EntityRef,
    pub deleted: bool,
    pub created_by: ActorId,
    pub project_ids: Vec<ProjectId>,
    pub dss: Option<DssAttrs>,
}

impl EntityState {
    pub fn new(entity: EntityRef, created_by: ActorId) -> Self {
        Self {
            entity,
            deleted: false,
            created_by,
            project_ids: Vec::new(),
            dss: None,
        }
    }

    pub fn with_projects(mut self, project_ids: impl IntoIterator<Item = ProjectId>) -> Self {
        self.project_ids = project_ids.into_iter().collect();
        self
    }

    pub fn with_dss(mut self, container_id: DbId, imported: bool) -> Self {
        self.dss = Some(DssAttrs {
            container_id,
            imported,
        });
        self
    }

    pub fn trashed(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity.entity_type
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.entity.has(capability)
    }

    /// DSS attributes, but only when the entity type honours DSS policy.
    pub fn dss_attrs(&self) -> Option<&DssAttrs> {
        if self.has(Capability::DssOverridable) {
            self.dss.as_ref()
        } else {
            None
        }
    }
}
