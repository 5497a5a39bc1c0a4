/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Identifier of an actor (an authenticated user or a synthetic import actor).
pub type ActorId = DbId;

/// Identifier of a project node.
pub type ProjectId = DbId;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
