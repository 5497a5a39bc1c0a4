//! Transactional access commands.
//!
//! Every mutating command has the same shape:
//!
//! 1. open a transaction and row-lock the target (`SELECT ... FOR UPDATE`),
//! 2. load the [`AccessSnapshot`] inside that transaction,
//! 3. ask the core [`Engine`] for a decision,
//! 4. write the primary mutation and its cascades,
//! 5. commit.
//!
//! Any `Err` before step 5 drops the transaction, which rolls it back.

mod containers;
mod entities;
mod import;
mod locks;
mod privileges;
mod projects;
mod snapshot;

use sqlx::{PgConnection, PgPool};
use workbench_core::cascade::Cascade;
use workbench_core::config::EngineConfig;
use workbench_core::engine::{AccessSnapshot, Engine, Operation};
use workbench_core::error::CoreError;
use workbench_core::locking::LockRecord;
use workbench_core::privilege::PrivilegeOverride;
use workbench_core::trusted::TrustedContext;
use workbench_core::types::Timestamp;

use crate::error::{DbError, DbResult};
use crate::repositories::{AssignmentRepo, EntityLockRepo, PrivilegeRepo, RoleRepo};

pub use import::ImportSession;

/// Entry point for every access-controlled mutation.
#[derive(Debug, Clone)]
pub struct Workbench {
    pool: PgPool,
    engine: Engine,
}

impl Workbench {
    pub fn new(pool: PgPool, config: EngineConfig) -> Self {
        Self {
            pool,
            engine: Engine::new(config),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Run the engine and log rejections.
    fn decide(
        &self,
        snapshot: &AccessSnapshot,
        op: Operation,
        trusted: &TrustedContext,
    ) -> DbResult<()> {
        self.engine
            .can(snapshot, op, trusted, now())
            .map_err(|err| {
                tracing::warn!(
                    actor_id = snapshot.actor.id,
                    entity_type = %snapshot.entity.entity_type(),
                    entity_id = snapshot.entity.entity.id,
                    action = ?op,
                    trusted = trusted.is_trusted(),
                    error = %err,
                    "Operation rejected"
                );
                DbError::from(err)
            })
    }

    /// Execute follow-up writes inside the caller's transaction.
    async fn apply_cascades(
        &self,
        conn: &mut PgConnection,
        cascades: &[Cascade],
    ) -> DbResult<()> {
        for cascade in cascades {
            match cascade {
                Cascade::GrantOwner { entity, actor_id } => {
                    PrivilegeRepo::upsert(&mut *conn, &PrivilegeOverride::owner(*entity, *actor_id))
                        .await?;
                }
                Cascade::GrantParticipant { entity, actor_id } => {
                    PrivilegeRepo::grant_participant(&mut *conn, *entity, *actor_id).await?;
                }
                Cascade::RevokeParticipant { entity, actor_id } => {
                    let Some(row) = PrivilegeRepo::find(&mut *conn, *entity, *actor_id).await?
                    else {
                        continue;
                    };
                    let mut row = row.to_core()?;
                    row.revoke_participation();
                    if row.is_neutral() {
                        PrivilegeRepo::delete(&mut *conn, *entity, *actor_id).await?;
                    } else {
                        PrivilegeRepo::upsert(&mut *conn, &row).await?;
                    }
                }
                Cascade::AcquireLock { entity, actor_id } => {
                    let record = LockRecord {
                        entity: *entity,
                        owner_id: *actor_id,
                        acquired_at: now(),
                        webdav: false,
                    };
                    EntityLockRepo::upsert(&mut *conn, &record).await?;
                }
                Cascade::AssignManager {
                    project_id,
                    actor_id,
                } => {
                    let manager_role = &self.config().manager_role;
                    let role = RoleRepo::find_by_name(&mut *conn, manager_role)
                        .await?
                        .ok_or_else(|| {
                            CoreError::Internal(format!("Role '{manager_role}' is not seeded"))
                        })?;
                    AssignmentRepo::upsert(&mut *conn, *project_id, *actor_id, role.id).await?;
                }
            }
            tracing::debug!(cascade = ?cascade, "Cascade applied");
        }
        Ok(())
    }
}

fn now() -> Timestamp {
    chrono::Utc::now()
}
