//! Explicit trusted context for the DSS import pipeline.
//!
//! Trust is a value passed through call signatures, never ambient state, so
//! a disabled-checks mode cannot leak from one request into another. A
//! trusted context skips the global, project and override permission checks
//! only; the soft-delete, lock and DSS clauses still apply.

use crate::types::ActorId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Trust {
    #[default]
    None,
    Import { actor_id: ActorId, reason: String },
}

/// Whether permission checks are bypassed for the current unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrustedContext {
    trust: Trust,
}

impl TrustedContext {
    /// Ordinary request: every check applies.
    pub fn none() -> Self {
        Self::default()
    }

    /// Import run on behalf of the synthetic `actor_id`.
    pub fn import(actor_id: ActorId, reason: impl Into<String>) -> Self {
        Self {
            trust: Trust::Import {
                actor_id,
                reason: reason.into(),
            },
        }
    }

    pub fn is_trusted(&self) -> bool {
        !matches!(self.trust, Trust::None)
    }

    /// The synthetic actor the import acts as.
    pub fn import_actor(&self) -> Option<ActorId> {
        match &self.trust {
            Trust::Import { actor_id, .. } => Some(*actor_id),
            Trust::None => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.trust {
            Trust::Import { reason, .. } => Some(reason.as_str()),
            Trust::None => None,
        }
    }
}
