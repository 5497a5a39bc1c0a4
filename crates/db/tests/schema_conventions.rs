//! Structural checks every migration must keep passing.

use sqlx::PgPool;

async fn public_tables(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
           AND table_name <> '_sqlx_migrations' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Surrogate keys are BIGSERIAL.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_ids_are_bigint(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name::text, data_type::text FROM information_schema.columns \
         WHERE table_schema = 'public' AND column_name = 'id' \
           AND table_name <> '_sqlx_migrations'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!rows.is_empty());
    for (table, data_type) in &rows {
        assert_eq!(data_type, "bigint", "{table}.id");
    }
}

/// Join tables included, every table carries `created_at` and `updated_at`.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_every_table_has_timestamps(pool: PgPool) {
    for table in public_tables(&pool).await {
        for column in ["created_at", "updated_at"] {
            let data_type: Option<String> = sqlx::query_scalar(
                "SELECT data_type::text FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2",
            )
            .bind(&table)
            .bind(column)
            .fetch_optional(&pool)
            .await
            .unwrap();

            assert_eq!(
                data_type.as_deref(),
                Some("timestamp with time zone"),
                "{table}.{column}"
            );
        }
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_text_instead_of_varchar(pool: PgPool) {
    let columns: Vec<String> = sqlx::query_scalar(
        "SELECT table_name || '.' || column_name FROM information_schema.columns \
         WHERE table_schema = 'public' AND data_type = 'character varying' \
           AND table_name <> '_sqlx_migrations'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(columns.is_empty(), "VARCHAR columns: {columns:?}");
}

/// Each foreign-key column has an index of its own, so cascades and
/// membership lookups never scan.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_foreign_keys_are_indexed(pool: PgPool) {
    let fk_columns: Vec<(String, String)> = sqlx::query_as(
        "SELECT DISTINCT tc.table_name::text, kcu.column_name::text \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name \
          AND kcu.table_schema = tc.table_schema \
         WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!fk_columns.is_empty());
    for (table, column) in &fk_columns {
        let indexed: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes \
             WHERE schemaname = 'public' AND tablename = $1 AND indexdef LIKE $2)",
        )
        .bind(table)
        .bind(format!("%({column})%"))
        .fetch_one(&pool)
        .await
        .unwrap();

        assert!(indexed, "{table}.{column} has no index");
    }
}

/// No foreign key falls back to the implicit NO ACTION rules.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_foreign_keys_declare_rules(pool: PgPool) {
    let rules: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT rc.constraint_name::text, rc.delete_rule::text, rc.update_rule::text \
         FROM information_schema.referential_constraints rc \
         WHERE rc.constraint_schema = 'public'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for (constraint, on_delete, on_update) in &rules {
        assert_ne!(on_delete, "NO ACTION", "{constraint} ON DELETE");
        assert_ne!(on_update, "NO ACTION", "{constraint} ON UPDATE");
    }
}
