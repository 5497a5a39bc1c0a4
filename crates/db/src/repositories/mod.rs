//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! `&mut PgConnection` as the first argument, so the same method runs on a
//! pooled connection or inside an open transaction (`&mut *tx`).

pub mod actor_repo;
pub mod assignment_repo;
pub mod dss_container_repo;
pub mod entity_lock_repo;
pub mod entity_repo;
pub mod privilege_repo;
pub mod project_repo;
pub mod role_repo;

pub use actor_repo::ActorRepo;
pub use assignment_repo::AssignmentRepo;
pub use dss_container_repo::DssContainerRepo;
pub use entity_lock_repo::EntityLockRepo;
pub use entity_repo::EntityRepo;
pub use privilege_repo::PrivilegeRepo;
pub use project_repo::ProjectRepo;
pub use role_repo::RoleRepo;
