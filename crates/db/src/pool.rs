//! Database connection pool management
//!
//! A single process-scoped [`Database`] owns the sqlx pool. It is created with
//! [`Database::init`] at startup, shared with modules by reference counting,
//! and closed with [`Database::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bookshelf_kernel::settings::DatabaseSettings;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tokio::sync::OnceCell;

use crate::record::decode_row;
use crate::{DbError, RecordSet, Statement};

/// Lazily connected PostgreSQL pool.
#[derive(Debug)]
pub struct Database {
    settings: DatabaseSettings,
    pool: OnceCell<PgPool>,
    closed: AtomicBool,
}

impl Database {
    /// Create a manager without connecting; the pool is established on first use.
    pub fn new(settings: &DatabaseSettings) -> Self {
        Self {
            settings: settings.clone(),
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a manager and establish the pool immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingSetting`] or [`DbError::Connection`] when the
    /// pool cannot be established. Callers treat this as fatal.
    pub async fn init(settings: &DatabaseSettings) -> Result<Self, DbError> {
        let db = Self::new(settings);
        db.ensure_connection().await?;
        Ok(db)
    }

    /// Return the live pool, establishing it if this is the first call.
    ///
    /// Concurrent first callers share one connection attempt. A failed attempt
    /// leaves the manager unconnected, so the next call tries again.
    pub async fn ensure_connection(&self) -> Result<&PgPool, DbError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::Closed);
        }

        if let Some(pool) = self.pool.get() {
            tracing::trace!("using existing database pool");
            return Ok(pool);
        }

        self.pool.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<PgPool, DbError> {
        let options = connect_options(&self.settings)?;
        let endpoint = self.settings.endpoint();

        tracing::info!(endpoint = %endpoint, "connecting to database");

        let pool = pool_options(&self.settings)
            .connect_with(options)
            .await
            .map_err(|source| {
                tracing::error!(endpoint = %endpoint, error = %source, "database connection failed");
                DbError::Connection {
                    endpoint: endpoint.clone(),
                    source,
                }
            })?;

        tracing::info!(
            endpoint = %endpoint,
            max_connections = self.settings.max_connections,
            min_connections = self.settings.min_connections,
            "connected to database"
        );
        Ok(pool)
    }

    /// Run one statement and collect its rows or affected-row count.
    pub async fn execute(&self, statement: &Statement) -> Result<RecordSet, DbError> {
        let pool = self.ensure_connection().await?;
        let query = statement.to_query();

        tracing::debug!(
            sql = statement.sql(),
            params = statement.params().len(),
            "executing statement"
        );

        if statement.returns_rows() {
            let rows = query.fetch_all(pool).await?;
            let records = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
            Ok(RecordSet::new(records.len() as u64, records))
        } else {
            let result = query.execute(pool).await?;
            Ok(RecordSet::new(result.rows_affected(), Vec::new()))
        }
    }

    /// Round trip `SELECT 1` through the pool.
    pub async fn ping(&self) -> Result<(), DbError> {
        let pool = self.ensure_connection().await?;
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Close the pool and refuse further statements.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            tracing::info!(endpoint = %self.settings.endpoint(), "database pool closed");
        }
    }
}

/// Build connection options, failing on missing required settings before any I/O.
pub fn connect_options(settings: &DatabaseSettings) -> Result<PgConnectOptions, DbError> {
    let host = required(&settings.host, "host")?;
    let user = required(&settings.user, "user")?;
    let password = required(&settings.password, "password")?;
    let name = required(&settings.name, "name")?;

    Ok(PgConnectOptions::new()
        .host(host)
        .port(settings.port)
        .username(user)
        .password(password)
        .database(name)
        .options([(
            "statement_timeout",
            settings.statement_timeout_ms.to_string(),
        )]))
}

fn pool_options(settings: &DatabaseSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .idle_timeout(Duration::from_millis(settings.idle_timeout_ms))
        .acquire_timeout(Duration::from_millis(settings.connect_timeout_ms))
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, DbError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(DbError::MissingSetting(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatementBuilder;

    fn complete_settings() -> DatabaseSettings {
        DatabaseSettings {
            host: Some("db.internal".to_string()),
            port: 6543,
            user: Some("librarian".to_string()),
            password: Some("secret".to_string()),
            name: Some("library".to_string()),
            ..DatabaseSettings::default()
        }
    }

    #[test]
    fn connect_options_use_settings() {
        let options = connect_options(&complete_settings()).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "librarian");
        assert_eq!(options.get_database(), Some("library"));
    }

    #[test]
    fn connect_options_require_every_credential() {
        let mut settings = complete_settings();
        settings.password = None;
        assert!(matches!(
            connect_options(&settings),
            Err(DbError::MissingSetting("password"))
        ));

        let mut settings = complete_settings();
        settings.host = Some("   ".to_string());
        assert!(matches!(
            connect_options(&settings),
            Err(DbError::MissingSetting("host"))
        ));
    }

    #[tokio::test]
    async fn ensure_connection_fails_fast_without_settings() {
        let db = Database::new(&DatabaseSettings::default());
        let err = db.ensure_connection().await.unwrap_err();
        assert!(matches!(err, DbError::MissingSetting("host")));
        assert!(db.pool.get().is_none());
    }

    #[tokio::test]
    async fn init_reports_missing_settings() {
        let err = Database::init(&DatabaseSettings::default()).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn shutdown_rejects_further_statements() {
        let db = Database::new(&complete_settings());
        db.shutdown().await;

        let statement = StatementBuilder::query("SELECT 1").build();
        assert!(matches!(db.execute(&statement).await, Err(DbError::Closed)));
        assert!(matches!(db.ensure_connection().await, Err(DbError::Closed)));
    }

    // Integration tests require a real database.
    // Run with: BOOKSHELF_DATABASE__HOST=... cargo test -p bookshelf-db -- --ignored

    fn settings_from_env() -> DatabaseSettings {
        bookshelf_kernel::settings::Settings::load()
            .expect("settings")
            .database
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn execute_returns_rows_and_counts() {
        let db = Database::init(&settings_from_env()).await.expect("connect");

        let mut builder = StatementBuilder::query("SELECT ");
        builder
            .push_bind(41_i64)
            .push(" + 1 AS answer, ")
            .push_bind("shelf")
            .push("::text AS label");
        let set = db.execute(&builder.build()).await.expect("query");

        assert_eq!(set.rows_affected, 1);
        let record = set.first().expect("row");
        assert_eq!(record["answer"], serde_json::json!(42));
        assert_eq!(record["label"], serde_json::json!("shelf"));

        db.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn concurrent_pool_access() {
        let db = std::sync::Arc::new(Database::init(&settings_from_env()).await.expect("connect"));

        let handles: Vec<_> = (0..10_i64)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    let mut builder = StatementBuilder::query("SELECT ");
                    builder.push_bind(i).push("::bigint AS n");
                    let set = db.execute(&builder.build()).await.expect("query");
                    set.first().expect("row")["n"].as_i64().expect("int")
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.expect("task panicked"), i as i64);
        }
    }
}
