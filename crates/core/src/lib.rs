//! Authorization and concurrency-control engine for workbench entities.
//!
//! This crate is pure logic with no database dependencies. The persistence
//! layer (`workbench-db`) loads an [`engine::AccessSnapshot`] inside the
//! mutation's transaction, asks the [`engine::Engine`] for a decision, and
//! applies the resulting [`cascade::Cascade`] commands before committing.
//!
//! ```text
//! permissions ─┐
//! membership ──┤
//! privilege ───┼──► engine::Engine::can(snapshot, operation, trusted, now)
//! soft_delete ─┤
//! locking ─────┤
//! dss ─────────┘
//! ```

pub mod cascade;
pub mod config;
pub mod dss;
pub mod engine;
pub mod entity;
pub mod error;
pub mod locking;
pub mod membership;
pub mod permissions;
pub mod privilege;
pub mod roles;
pub mod soft_delete;
pub mod trusted;
pub mod types;
