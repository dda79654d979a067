mod jobs;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use stockroom_db::PgStore;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stockroom-cli")]
#[command(about = "Stockroom catalog operations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Mirror the POS inventory, then normalize one batch of new rows
    Sync {
        /// Skip the normalization pass after syncing
        #[arg(long)]
        no_normalize: bool,
    },
    /// Classify pending raw rows into parents and variants
    Normalize {
        /// Rows to process (defaults to STOCKROOM_NORMALIZE_BATCH_LIMIT)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
    },
    /// Re-derive every parent's aggregate stock from its variants
    RecomputeStock,
    /// Show recent job runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("stockroom-cli: no command given; run with --help");
        return Ok(());
    };

    let config = stockroom_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = stockroom_db::PoolConfig::from_app_config(&config);
    let pool = stockroom_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            stockroom_db::ping(&pool).await?;
            println!("database: ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = stockroom_db::run_migrations(&pool).await?;
            tracing::info!(applied, "migrations up to date");
            println!("applied {applied} migration(s)");
        }
        Commands::Sync { no_normalize } => {
            jobs::run_sync(&config, Arc::new(PgStore::new(pool)), !no_normalize).await?;
        }
        Commands::Normalize { limit } => {
            jobs::run_normalize(&config, Arc::new(PgStore::new(pool)), limit).await?;
        }
        Commands::RecomputeStock => {
            jobs::run_recompute(&config, Arc::new(PgStore::new(pool))).await?;
        }
        Commands::Runs { limit } => {
            jobs::list_runs(&PgStore::new(pool), limit).await?;
        }
    }

    Ok(())
}
