//! DSS container rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use workbench_core::dss::{DssContainer, ReadWriteSetting};
use workbench_core::error::CoreError;
use workbench_core::types::{DbId, Timestamp};

/// A row from the `dss_containers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DssContainerRow {
    pub id: DbId,
    pub path: String,
    pub read_write_setting: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DssContainerRow {
    pub fn to_core(&self) -> Result<DssContainer, CoreError> {
        Ok(DssContainer {
            id: self.id,
            path: self.path.clone(),
            read_write_setting: self.read_write_setting.parse()?,
        })
    }
}

/// DTO for registering a container.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDssContainer {
    pub path: String,
    pub read_write_setting: ReadWriteSetting,
}
