//! Application lifecycle: connect, register, migrate, serve, tear down.

use std::sync::Arc;

use anyhow::Context;
use bookshelf_db::{run_migrations, Database};
use bookshelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use bookshelf_telemetry::HttpMetrics;

use crate::modules;

/// Run the server until a shutdown signal arrives.
///
/// A database that cannot be reached at startup is fatal.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    bookshelf_telemetry::init(&settings.telemetry).context("failed to initialize telemetry")?;

    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.endpoint(),
        "bookshelf bootstrap starting"
    );

    let db = connect(&settings).await?;
    let registry = build_registry(db.clone())?;
    let ctx = InitCtx {
        settings: &settings,
    };

    registry.init_all(&ctx).await?;
    apply_migrations(&db, &registry).await?;
    registry.start_all(&ctx).await?;

    let metrics = settings
        .telemetry
        .metrics_enabled
        .then(|| Arc::new(HttpMetrics::new()));

    let served = bookshelf_http::start_server(&registry, &settings, metrics).await;

    let stopped = registry.stop_all().await;
    db.shutdown().await;
    tracing::info!("bookshelf shut down");

    served?;
    stopped
}

/// Connect and apply pending migrations without serving.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let db = connect(settings).await?;
    let registry = build_registry(db.clone())?;
    let applied = apply_migrations(&db, &registry).await;
    db.shutdown().await;
    applied
}

/// Connect and run `SELECT 1`.
pub async fn check_database(settings: &Settings) -> anyhow::Result<()> {
    let db = connect(settings).await?;
    let result = db
        .ping()
        .await
        .with_context(|| format!("database at {} did not answer", settings.database.endpoint()));
    db.shutdown().await;
    result
}

/// Registry with every application module, backed by `db`.
pub fn build_registry(db: Arc<Database>) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, db)?;
    Ok(registry)
}

async fn connect(settings: &Settings) -> anyhow::Result<Arc<Database>> {
    let db = Database::init(&settings.database)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(db))
}

async fn apply_migrations(db: &Database, registry: &ModuleRegistry) -> anyhow::Result<usize> {
    run_migrations(db, &registry.collect_migrations())
        .await
        .context("failed to apply migrations")
}
