use anyhow::Context;
use bookshelf_app::bootstrap;
use bookshelf_kernel::settings::Settings;
use clap::{Parser, Subcommand};

/// Operate the bookshelf service.
#[derive(Debug, Parser)]
#[command(name = "bookshelf", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server until ctrl-c or SIGTERM
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Connect to the database and run `SELECT 1`
    CheckDb,
    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load bookshelf settings")?;

    match cli.command {
        Command::Serve => bootstrap::run(settings).await,
        Command::Migrate => {
            bookshelf_telemetry::init(&settings.telemetry)?;
            let applied = bootstrap::migrate(&settings).await?;
            tracing::info!(applied, "migrate finished");
            Ok(())
        }
        Command::CheckDb => {
            bookshelf_telemetry::init(&settings.telemetry)?;
            bootstrap::check_database(&settings).await?;
            tracing::info!(db = %settings.database.endpoint(), "database reachable");
            Ok(())
        }
        Command::Config => {
            let rendered = serde_json::to_string_pretty(&settings.redacted())
                .context("failed to render settings")?;
            println!("{rendered}");
            Ok(())
        }
    }
}
