//! Engine configuration loaded from environment variables.

use chrono::Duration;

use crate::error::CoreError;
use crate::locking::{
    validate_lock_ttl, LockTtl, DEFAULT_LOCK_TTL_MINS, DEFAULT_WEBDAV_LOCK_TTL_MINS,
};
use crate::roles::{ROLE_PROJECT_MANAGER, ROLE_STORAGE_CURATOR};

/// Decision-engine configuration.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Normal and WebDAV lock windows.
    pub locks: LockTtl,
    /// Role whose overrides on DSS entities are protected.
    pub curator_role: String,
    /// Role every project must keep at least one holder of.
    pub manager_role: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locks: LockTtl::default(),
            curator_role: ROLE_STORAGE_CURATOR.to_string(),
            manager_role: ROLE_PROJECT_MANAGER.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default           |
    /// |------------------------|-------------------|
    /// | `LOCK_TTL_MINS`        | `30`              |
    /// | `WEBDAV_LOCK_TTL_MINS` | `60`              |
    /// | `CURATOR_ROLE`         | `Storage Curator` |
    /// | `MANAGER_ROLE`         | `Project Manager` |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let normal = read_minutes(&lookup, "LOCK_TTL_MINS", DEFAULT_LOCK_TTL_MINS)?;
        let webdav = read_minutes(&lookup, "WEBDAV_LOCK_TTL_MINS", DEFAULT_WEBDAV_LOCK_TTL_MINS)?;
        let defaults = Self::default();

        Ok(Self {
            locks: LockTtl {
                normal: Duration::minutes(normal),
                webdav: Duration::minutes(webdav),
            },
            curator_role: non_empty(lookup("CURATOR_ROLE")).unwrap_or(defaults.curator_role),
            manager_role: non_empty(lookup("MANAGER_ROLE")).unwrap_or(defaults.manager_role),
        })
    }
}

fn read_minutes<F>(lookup: &F, key: &'static str, default: i64) -> Result<i64, CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup(key)) else {
        return Ok(default);
    };
    let minutes: i64 = raw
        .parse()
        .map_err(|_| CoreError::validation(key, format!("{key} must be an integer, got '{raw}'")))?;
    validate_lock_ttl(key, minutes)?;
    Ok(minutes)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
