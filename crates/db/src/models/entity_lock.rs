//! Entity lock rows.

use serde::Serialize;
use sqlx::FromRow;
use workbench_core::entity::EntityRef;
use workbench_core::error::CoreError;
use workbench_core::locking::{LockRecord, LockTtl};
use workbench_core::types::{ActorId, DbId, Timestamp};

/// A row from the `entity_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EntityLock {
    pub id: DbId,
    pub entity_type: String,
    pub entity_id: DbId,
    pub owner_id: ActorId,
    pub acquired_at: Timestamp,
    pub webdav: bool,
}

impl EntityLock {
    pub fn to_record(&self) -> Result<LockRecord, CoreError> {
        Ok(LockRecord {
            entity: EntityRef::new(self.entity_type.parse()?, self.entity_id),
            owner_id: self.owner_id,
            acquired_at: self.acquired_at,
            webdav: self.webdav,
        })
    }
}

/// The active lock on an entity, as reported by `lock_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub owner_id: ActorId,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    pub webdav: bool,
}

impl LockStatus {
    pub fn from_record(record: &LockRecord, ttl: &LockTtl) -> Self {
        Self {
            owner_id: record.owner_id,
            acquired_at: record.acquired_at,
            expires_at: record.expires_at(ttl),
            webdav: record.webdav,
        }
    }
}
