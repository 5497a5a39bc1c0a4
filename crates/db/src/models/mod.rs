//! Row structs and input DTOs, one module per table family.

pub mod actor;
pub mod dss;
pub mod entity;
pub mod entity_lock;
pub mod privilege;
pub mod project;
pub mod role;
