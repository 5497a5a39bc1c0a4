//! Repository for `actors` and the global permission tables.

use sqlx::PgConnection;
use workbench_core::permissions;
use workbench_core::types::{ActorId, DbId};

use crate::models::actor::{Actor, CreateActor};

/// Column list for the `actors` table.
const COLUMNS: &str = "id, username, is_superuser, created_at";

/// Provides actor CRUD and global permission loading.
pub struct ActorRepo;

impl ActorRepo {
    /// Insert a new actor.
    pub async fn create(conn: &mut PgConnection, input: &CreateActor) -> Result<Actor, sqlx::Error> {
        let query = format!(
            "INSERT INTO actors (username, is_superuser) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Actor>(&query)
            .bind(&input.username)
            .bind(input.is_superuser)
            .fetch_one(conn)
            .await
    }

    /// Find an actor by ID.
    pub async fn find_by_id(conn: &mut PgConnection, id: ActorId) -> Result<Option<Actor>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM actors WHERE id = $1");
        sqlx::query_as::<_, Actor>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Load an actor together with its global permissions.
    ///
    /// Global permissions are the union of direct grants and the grants of
    /// every group the actor belongs to.
    pub async fn load_principal(
        conn: &mut PgConnection,
        id: ActorId,
    ) -> Result<Option<permissions::Actor>, sqlx::Error> {
        let Some(actor) = Self::find_by_id(&mut *conn, id).await? else {
            return Ok(None);
        };
        if actor.is_superuser {
            return Ok(Some(permissions::Actor::superuser(actor.id)));
        }

        let codenames: Vec<String> = sqlx::query_scalar(
            "SELECT codename FROM actor_permissions WHERE actor_id = $1 \
             UNION \
             SELECT gp.codename FROM group_permissions gp \
             JOIN actor_groups ag ON ag.group_id = gp.group_id \
             WHERE ag.actor_id = $1",
        )
        .bind(id)
        .fetch_all(conn)
        .await?;

        Ok(Some(permissions::Actor::new(actor.id).with_permissions(codenames)))
    }

    /// Grant a permission codename directly to an actor. Idempotent.
    pub async fn grant_permission(
        conn: &mut PgConnection,
        actor_id: ActorId,
        codename: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO actor_permissions (actor_id, codename) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(actor_id)
        .bind(codename)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Create a permission group with the given codenames. Returns its ID.
    pub async fn create_group(
        conn: &mut PgConnection,
        name: &str,
        codenames: &[String],
    ) -> Result<DbId, sqlx::Error> {
        let id: DbId =
            sqlx::query_scalar("INSERT INTO permission_groups (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(&mut *conn)
                .await?;
        sqlx::query(
            "INSERT INTO group_permissions (group_id, codename) \
             SELECT $1, unnest($2::text[])",
        )
        .bind(id)
        .bind(codenames)
        .execute(conn)
        .await?;
        Ok(id)
    }

    /// Add an actor to a permission group. Idempotent.
    pub async fn add_to_group(
        conn: &mut PgConnection,
        actor_id: ActorId,
        group_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO actor_groups (actor_id, group_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(actor_id)
        .bind(group_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}
