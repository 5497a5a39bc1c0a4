//! DSS container read/write policy.
//!
//! The policy only ever narrows a decision: it is evaluated after every other
//! clause and can turn an allow into a rejection, never the reverse.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{DssAttrs, EditKind};
use crate::error::CoreError;
use crate::types::DbId;

/// Container-level write mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadWriteSetting {
    /// No content writes at all; metadata edits only.
    #[serde(rename = "RO")]
    ReadOnly,
    /// Existing entities editable, no new children.
    #[serde(rename = "RWNN")]
    ReadWriteNoNew,
    /// New entities editable, imported ones content-read-only.
    #[serde(rename = "RWON")]
    ReadWriteOnlyNew,
    /// No additional restriction.
    #[serde(rename = "RWA")]
    ReadWriteAll,
}

impl ReadWriteSetting {
    pub const ALL: &'static [ReadWriteSetting] = &[
        ReadWriteSetting::ReadOnly,
        ReadWriteSetting::ReadWriteNoNew,
        ReadWriteSetting::ReadWriteOnlyNew,
        ReadWriteSetting::ReadWriteAll,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReadWriteSetting::ReadOnly => "RO",
            ReadWriteSetting::ReadWriteNoNew => "RWNN",
            ReadWriteSetting::ReadWriteOnlyNew => "RWON",
            ReadWriteSetting::ReadWriteAll => "RWA",
        }
    }
}

impl fmt::Display for ReadWriteSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadWriteSetting {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReadWriteSetting::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                CoreError::validation(
                    "read_write_setting",
                    format!("Invalid read/write setting '{s}'. Must be one of: RO, RWNN, RWON, RWA"),
                )
            })
    }
}

/// A DSS container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssContainer {
    pub id: DbId,
    pub path: String,
    pub read_write_setting: ReadWriteSetting,
}

/// The DSS-relevant shape of a requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DssOperation {
    /// Create a new DSS child. `imported` is `true` for the import pipeline.
    Create { imported: bool },
    Edit(EditKind),
    Trash,
    Restore,
    Delete,
}

fn reject(container: &DssContainer, field: &'static str, what: &str) -> CoreError {
    CoreError::validation(
        field,
        format!(
            "{what} is not allowed: container '{}' is {}",
            container.path, container.read_write_setting
        ),
    )
}

/// Rules that hold in every container mode and for every actor, superusers
/// included: the DSS flag never changes and no edit carries an entity across
/// a container boundary. `attrs` is `None` for a storage entity outside any
/// container.
pub fn check_invariants(attrs: Option<&DssAttrs>, kind: EditKind) -> Result<(), CoreError> {
    let own_container = attrs.map(|a| a.container_id);
    match kind {
        EditKind::ToggleDssFlag => Err(CoreError::validation(
            "is_dss",
            "The DSS flag of an entity can never be changed",
        )),
        EditKind::Move { target_container } if target_container != own_container => {
            let message = match own_container {
                Some(id) => format!("Entities of DSS container {id} cannot be moved out of it"),
                None => "Entities outside DSS containers cannot be moved into one".to_string(),
            };
            Err(CoreError::validation("directory", message))
        }
        _ => Ok(()),
    }
}

/// Apply the container policy to `op` on an entity with `attrs`.
pub fn check(
    container: &DssContainer,
    attrs: &DssAttrs,
    op: DssOperation,
) -> Result<(), CoreError> {
    if let DssOperation::Edit(kind) = op {
        check_invariants(Some(attrs), kind)?;
    }

    match container.read_write_setting {
        ReadWriteSetting::ReadWriteAll => Ok(()),
        ReadWriteSetting::ReadOnly => match op {
            DssOperation::Create { imported: true } => Ok(()),
            DssOperation::Create { imported: false } => {
                Err(reject(container, "container", "Creating new entries"))
            }
            DssOperation::Edit(EditKind::MetadataOnly) => Ok(()),
            DssOperation::Edit(EditKind::Move { .. }) => {
                Err(reject(container, "directory", "Moving entries"))
            }
            DssOperation::Edit(_) => Err(reject(container, "content", "Editing content")),
            DssOperation::Trash | DssOperation::Restore | DssOperation::Delete => {
                Err(reject(container, "deleted", "Trashing or deleting entries"))
            }
        },
        ReadWriteSetting::ReadWriteNoNew => match op {
            DssOperation::Create { imported: false } => {
                Err(reject(container, "container", "Creating new entries"))
            }
            _ => Ok(()),
        },
        ReadWriteSetting::ReadWriteOnlyNew => match op {
            DssOperation::Create { .. } | DssOperation::Edit(EditKind::MetadataOnly) => Ok(()),
            _ if !attrs.imported => Ok(()),
            DssOperation::Edit(_) => Err(reject(container, "content", "Editing imported entries")),
            DssOperation::Trash | DssOperation::Restore | DssOperation::Delete => Err(reject(
                container,
                "deleted",
                "Trashing or deleting imported entries",
            )),
        },
    }
}
