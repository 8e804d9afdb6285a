//! Module migration runner.
//!
//! Applied migrations are recorded in `schema_migrations`, keyed by module
//! name and migration id. Each pending migration runs in its own transaction
//! together with its ledger insert.

use std::collections::HashSet;

use bookshelf_kernel::Migration;

use crate::{Database, DbError};

const CREATE_LEDGER: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        module     TEXT NOT NULL,
        id         TEXT NOT NULL,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (module, id)
    )
"#;

/// Apply every migration not yet recorded. Returns how many were applied.
pub async fn run_migrations(
    db: &Database,
    migrations: &[(String, Migration)],
) -> Result<usize, DbError> {
    let pool = db.ensure_connection().await?;

    sqlx::query(CREATE_LEDGER).execute(pool).await?;

    let applied: HashSet<(String, String)> =
        sqlx::query_as::<_, (String, String)>("SELECT module, id FROM schema_migrations")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let todo = pending(migrations, &applied);
    if todo.is_empty() {
        tracing::info!("schema is up to date");
        return Ok(0);
    }

    for (module, migration) in &todo {
        tracing::info!(module = %module, migration = migration.id, "applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.up).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (module, id) VALUES ($1, $2)")
            .bind(module.as_str())
            .bind(migration.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    tracing::info!(applied = todo.len(), "migrations complete");
    Ok(todo.len())
}

fn pending<'a>(
    migrations: &'a [(String, Migration)],
    applied: &HashSet<(String, String)>,
) -> Vec<&'a (String, Migration)> {
    migrations
        .iter()
        .filter(|(module, migration)| {
            !applied.contains(&(module.clone(), migration.id.to_string()))
        })
        .collect()
}
