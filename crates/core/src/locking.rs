//! Advisory entity locks (normal and WebDAV).
//!
//! Lock rows are never swept: expiry is computed lazily from `acquired_at`
//! plus the TTL of the lock's kind, and an expired row stays inert until the
//! next acquisition supersedes it.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::entity::{Capability, EntityRef, EntityState};
use crate::error::CoreError;
use crate::permissions::Actor;
use crate::types::{ActorId, Timestamp};

// ---------------------------------------------------------------------------
// Lock duration constants
// ---------------------------------------------------------------------------

/// Default normal lock duration in minutes.
pub const DEFAULT_LOCK_TTL_MINS: i64 = 30;

/// Default WebDAV lock duration in minutes.
pub const DEFAULT_WEBDAV_LOCK_TTL_MINS: i64 = 60;

/// Minimum lock duration in minutes.
pub const MIN_LOCK_TTL_MINS: i64 = 1;

/// Maximum lock duration in minutes (one day).
pub const MAX_LOCK_TTL_MINS: i64 = 1440;

/// Validate a lock duration in minutes.
pub fn validate_lock_ttl(field: &'static str, minutes: i64) -> Result<(), CoreError> {
    if minutes < MIN_LOCK_TTL_MINS {
        return Err(CoreError::validation(
            field,
            format!("Lock duration must be at least {MIN_LOCK_TTL_MINS} minute(s), got {minutes}"),
        ));
    }
    if minutes > MAX_LOCK_TTL_MINS {
        return Err(CoreError::validation(
            field,
            format!("Lock duration must be at most {MAX_LOCK_TTL_MINS} minutes, got {minutes}"),
        ));
    }
    Ok(())
}

/// Independently configured TTLs for the two lock kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTtl {
    pub normal: Duration,
    pub webdav: Duration,
}

impl LockTtl {
    pub fn for_kind(&self, webdav: bool) -> Duration {
        if webdav {
            self.webdav
        } else {
            self.normal
        }
    }
}

impl Default for LockTtl {
    fn default() -> Self {
        Self {
            normal: Duration::minutes(DEFAULT_LOCK_TTL_MINS),
            webdav: Duration::minutes(DEFAULT_WEBDAV_LOCK_TTL_MINS),
        }
    }
}

// ---------------------------------------------------------------------------
// Lock rows
// ---------------------------------------------------------------------------

/// A stored lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub entity: EntityRef,
    pub owner_id: ActorId,
    pub acquired_at: Timestamp,
    pub webdav: bool,
}

impl LockRecord {
    pub fn expires_at(&self, ttl: &LockTtl) -> Timestamp {
        self.acquired_at + ttl.for_kind(self.webdav)
    }

    pub fn is_active(&self, now: Timestamp, ttl: &LockTtl) -> bool {
        now < self.expires_at(ttl)
    }
}

/// The newest non-expired lock among `locks`, if any.
pub fn active_lock<'a>(
    locks: &'a [LockRecord],
    now: Timestamp,
    ttl: &LockTtl,
) -> Option<&'a LockRecord> {
    locks
        .iter()
        .filter(|l| l.is_active(now, ttl))
        .max_by_key(|l| l.acquired_at)
}

/// `true` iff an active lock exists whose owner is not `actor`.
pub fn is_locked_by_other(
    locks: &[LockRecord],
    actor: ActorId,
    now: Timestamp,
    ttl: &LockTtl,
) -> bool {
    active_lock(locks, now, ttl).is_some_and(|l| l.owner_id != actor)
}

fn conflict(lock: &LockRecord, ttl: &LockTtl) -> CoreError {
    CoreError::LockConflict {
        entity: lock.entity,
        holder_id: lock.owner_id,
        expires_at: lock.expires_at(ttl),
    }
}

/// Fail with [`CoreError::LockConflict`] if someone else holds the lock.
pub fn ensure_not_locked_by_other(
    locks: &[LockRecord],
    actor: ActorId,
    now: Timestamp,
    ttl: &LockTtl,
) -> Result<(), CoreError> {
    match active_lock(locks, now, ttl) {
        Some(lock) if lock.owner_id != actor => Err(conflict(lock, ttl)),
        _ => Ok(()),
    }
}

/// Decide an acquisition and return the row to write.
///
/// `locks` are all rows currently stored for the entity. On success the
/// caller writes the returned row and deletes every other row for the
/// entity in the same transaction. Re-acquiring an own lock refreshes it.
pub fn plan_acquire(
    entity: &EntityState,
    locks: &[LockRecord],
    actor: ActorId,
    webdav: bool,
    now: Timestamp,
    ttl: &LockTtl,
) -> Result<LockRecord, CoreError> {
    if !entity.has(Capability::Lockable) {
        return Err(CoreError::validation(
            "entity_type",
            format!("{} does not support locking", entity.entity_type()),
        ));
    }
    if entity.deleted {
        return Err(CoreError::validation(
            "deleted",
            format!("{} is in the trash and cannot be locked", entity.entity),
        ));
    }
    ensure_not_locked_by_other(locks, actor, now, ttl)?;
    Ok(LockRecord {
        entity: entity.entity,
        owner_id: actor,
        acquired_at: now,
        webdav,
    })
}

/// Decide whether `actor` may release the entity's locks.
///
/// Releasing with no rows is a no-op. An active lock held by someone else can
/// only be released by a superuser.
pub fn check_release(
    locks: &[LockRecord],
    actor: &Actor,
    now: Timestamp,
    ttl: &LockTtl,
) -> Result<(), CoreError> {
    if actor.is_superuser {
        return Ok(());
    }
    ensure_not_locked_by_other(locks, actor.id, now, ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn t0() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn task() -> EntityState {
        EntityState::new(EntityRef::new(EntityType::Task, 1), 1)
    }

    fn lock(owner_id: ActorId, acquired_at: Timestamp, webdav: bool) -> LockRecord {
        LockRecord {
            entity: task().entity,
            owner_id,
            acquired_at,
            webdav,
        }
    }

    // -----------------------------------------------------------------------
    // Duration validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_valid_lock_ttls() {
        assert!(validate_lock_ttl("ttl", 1).is_ok());
        assert!(validate_lock_ttl("ttl", DEFAULT_LOCK_TTL_MINS).is_ok());
        assert!(validate_lock_ttl("ttl", 1440).is_ok());
    }

    #[test]
    fn test_lock_ttl_out_of_range() {
        assert!(validate_lock_ttl("ttl", 0).unwrap_err().to_string().contains("at least"));
        assert!(validate_lock_ttl("ttl", 1441).unwrap_err().to_string().contains("at most"));
        assert!(validate_lock_ttl("ttl", -5).is_err());
    }

    // -----------------------------------------------------------------------
    // Lazy expiry
    // -----------------------------------------------------------------------

    #[test]
    fn test_normal_and_webdav_expire_independently() {
        let ttl = LockTtl::default();
        let normal = lock(1, t0(), false);
        let webdav = lock(1, t0(), true);
        let later = t0() + Duration::minutes(45);
        assert!(!normal.is_active(later, &ttl));
        assert!(webdav.is_active(later, &ttl));
    }

    #[test]
    fn test_expired_lock_is_inert() {
        let ttl = LockTtl::default();
        let locks = vec![lock(1, t0(), false)];
        let later = t0() + Duration::minutes(31);
        assert!(!is_locked_by_other(&locks, 2, later, &ttl));
        assert!(active_lock(&locks, later, &ttl).is_none());
    }

    #[test]
    fn test_own_lock_does_not_block() {
        let ttl = LockTtl::default();
        let locks = vec![lock(1, t0(), false)];
        assert!(!is_locked_by_other(&locks, 1, t0(), &ttl));
        assert!(is_locked_by_other(&locks, 2, t0(), &ttl));
    }

    // -----------------------------------------------------------------------
    // Acquire / release
    // -----------------------------------------------------------------------

    #[test]
    fn test_acquire_conflict_reports_holder() {
        let ttl = LockTtl::default();
        let locks = vec![lock(1, t0(), false)];
        let result = plan_acquire(&task(), &locks, 2, false, t0(), &ttl);
        assert_matches!(result, Err(CoreError::LockConflict { holder_id: 1, .. }));
    }

    #[test]
    fn test_acquire_refreshes_own_lock() {
        let ttl = LockTtl::default();
        let locks = vec![lock(1, t0(), false)];
        let now = t0() + Duration::minutes(10);
        let row = plan_acquire(&task(), &locks, 1, true, now, &ttl).unwrap();
        assert_eq!(row.acquired_at, now);
        assert!(row.webdav);
    }

    #[test]
    fn test_acquire_supersedes_expired_lock() {
        let ttl = LockTtl::default();
        let locks = vec![lock(1, t0(), false)];
        let now = t0() + Duration::hours(2);
        assert_eq!(plan_acquire(&task(), &locks, 2, false, now, &ttl).unwrap().owner_id, 2);
    }

    #[test]
    fn test_acquire_rejects_trashed_and_unlockable() {
        let ttl = LockTtl::default();
        assert!(plan_acquire(&task().trashed(), &[], 1, false, t0(), &ttl).is_err());
        let project = EntityState::new(EntityRef::new(EntityType::Project, 1), 1);
        assert!(plan_acquire(&project, &[], 1, false, t0(), &ttl).is_err());
    }

    #[test]
    fn test_release_without_rows_is_noop() {
        let ttl = LockTtl::default();
        assert!(check_release(&[], &Actor::new(1), t0(), &ttl).is_ok());
    }

    #[test]
    fn test_release_of_foreign_active_lock() {
        let ttl = LockTtl::default();
        let locks = vec![lock(1, t0(), false)];
        assert!(check_release(&locks, &Actor::new(2), t0(), &ttl).is_err());
        assert!(check_release(&locks, &Actor::superuser(3), t0(), &ttl).is_ok());
        let later = t0() + Duration::hours(1);
        assert!(check_release(&locks, &Actor::new(2), later, &ttl).is_ok());
    }
}
