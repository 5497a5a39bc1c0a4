//! Actor rows and global permission assignments.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use workbench_core::types::{DbId, Timestamp};

/// A row from the `actors` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Actor {
    pub id: DbId,
    pub username: String,
    pub is_superuser: bool,
    pub created_at: Timestamp,
}

/// DTO for creating an actor.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateActor {
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
}

impl CreateActor {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: false,
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: true,
        }
    }
}
