//! GIB Sync - registry synchronization binary

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gib_common::logging::{init_logging, LogConfig, LogLevel};
use gib_sync::config::{env_name, load_env_file, SyncConfig};
use gib_sync::provider::SoapPartitionSource;
use gib_sync::store::{MemoryRegistryStore, PgRegistryStore, RegistryStore};
use gib_sync::sync::Synchronizer;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "gib-sync")]
#[command(author, version, about = "Synchronize the GIB e-invoice user list into Postgres")]
struct Cli {
    /// Environment name; loads `.env.<ENV>` before reading configuration.
    /// Defaults to `APP_ENV`, then `NODE_ENV`, then `production`
    #[arg(short, long)]
    env: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Run the whole pipeline against an in-memory store instead of Postgres
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = env_name(cli.env.as_deref());

    // Before logging, so LOG_* settings can come from the file too
    let env_file = load_env_file(&env);

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("gib-sync")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!(env = %env, dry_run = cli.dry_run, "GIB user list sync starting");
    match env_file {
        Some(path) => info!(path = %path.display(), "Loaded environment file"),
        None => info!(env = %env, "No environment file found, using process environment"),
    }

    let config = SyncConfig::from_env().context("Invalid configuration")?;
    config.log_summary();

    let source = SoapPartitionSource::new(&config.provider)?;

    let store: Arc<dyn RegistryStore> = if cli.dry_run {
        warn!("Dry run: records are kept in memory and discarded at exit");
        Arc::new(MemoryRegistryStore::new())
    } else {
        let store = PgRegistryStore::connect(&config.database, config.run.write_chunk_size)
            .await
            .context("Failed to connect to the database")?;
        if config.database.run_migrations {
            store.migrate().await?;
        }
        Arc::new(store)
    };

    let synchronizer = Synchronizer::new(config.sync_options(), Arc::new(source), store);

    match synchronizer.run().await {
        Ok(summary) => {
            if summary.aborted {
                error!(%summary, "Sync finished early after a failed batch write");
            } else {
                info!(%summary, "Sync complete");
            }
            Ok(())
        },
        Err(e) => {
            error!(error = %e, "Sync failed");
            Err(e.into())
        },
    }
}
