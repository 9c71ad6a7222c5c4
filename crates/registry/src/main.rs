//! Nimiq validators registry CLI
//!
//! This binary provides:
//! - Database initialisation
//! - Bulk import of validator JSON files
//! - Validator listings and score lookups printed as JSON

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nimiq_validators_registry::config::Config;
use nimiq_validators_registry::{
    to_normalized_json, BatchImporter, FetchOptions, IdenticonBranding, PayoutType, ScoreQuery,
    Storage, ValidatorStore,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nimiq-validators")]
#[command(version, about = "Nimiq validator registry and score queries", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "registry.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and run migrations
    InitDb,

    /// Import every validator JSON file from a folder
    Import {
        /// Folder holding `<address>.json` files (defaults to `import.folder`)
        #[arg(long)]
        folder: Option<String>,
    },

    /// List validators with at least one score
    List {
        /// Only this payout type (none, restake, direct)
        #[arg(long)]
        payout_type: Option<PayoutType>,

        /// Only these addresses (repeatable)
        #[arg(long = "address")]
        addresses: Vec<String>,

        /// Attach the activity of this epoch
        #[arg(long)]
        epoch: Option<i64>,

        /// Drop validators named "Unknown validator"
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        only_known: bool,

        /// Only validators active in the epoch (applied by the caller)
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        only_active: bool,

        /// Keep generated icons
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        with_identicons: bool,

        /// Include score components and size ratio
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        with_scores: bool,
    },

    /// Show validators by id with their latest score
    Scores {
        /// Validator ids (repeatable)
        #[arg(long = "id", required = true)]
        ids: Vec<i64>,
    },

    /// Show database status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    init_logging(cli.debug, &config)?;

    info!("Nimiq validators registry {}", env!("CARGO_PKG_VERSION"));

    let storage = open_storage(&config).await?;

    let result = match cli.command {
        Commands::InitDb => init_database(&storage).await,
        Commands::Import { folder } => import_validators(&storage, &config, folder).await,
        Commands::List {
            payout_type,
            addresses,
            epoch,
            only_known,
            only_active,
            with_identicons,
            with_scores,
        } => {
            let options = FetchOptions {
                payout_type,
                addresses,
                only_active,
                only_known,
                with_identicons,
                with_scores,
                epoch_number: epoch,
            };
            list_validators(&storage, &options).await
        }
        Commands::Scores { ids } => show_scores(&storage, &ids).await,
        Commands::Status => show_status(&storage).await,
    };

    storage.close().await;

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Load the config file, falling back to defaults only when it does not exist.
fn load_config(path: &str) -> Result<Config> {
    match Config::from_file(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if is_not_found {
                eprintln!("Config file {} not found, using defaults", path);
                Ok(Config::default())
            } else {
                Err(e).with_context(|| format!("Failed to load configuration from {}", path))
            }
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("nimiq_validators_registry=debug,nimiq_validators=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "nimiq_validators_registry={level},nimiq_validators={level}",
                level = config.logging.level
            ))
        })
    };

    // Logs go to stderr so command output stays parseable
    let registry = tracing_subscriber::registry().with(env_filter);
    if config.logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

async fn init_database(storage: &Storage) -> Result<()> {
    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    info!("Database initialized successfully!");
    print_stats(storage).await
}

async fn import_validators(
    storage: &Storage,
    config: &Config,
    folder: Option<String>,
) -> Result<()> {
    let folder = folder
        .or_else(|| config.import.folder.clone())
        .context("No import folder given; pass --folder or set import.folder")?;

    let store = ValidatorStore::new(Arc::new(storage.clone()), Arc::new(IdenticonBranding))
        .with_allowed_addresses(config.store.allowed_addresses.iter().cloned());
    let importer = BatchImporter::new(store).with_max_in_flight(config.import.max_in_flight);

    let summary = importer.import_validators_from_files(&folder).await?;
    print_json(&summary.ids)
}

async fn list_validators(storage: &Storage, options: &FetchOptions) -> Result<()> {
    let validators = ScoreQuery::new(storage.clone())
        .fetch_validators(options)
        .await?;
    print_json(&validators)
}

async fn show_scores(storage: &Storage, ids: &[i64]) -> Result<()> {
    let scores = ScoreQuery::new(storage.clone())
        .fetch_validators_score_by_ids(ids)
        .await?;
    print_json(&scores)
}

async fn show_status(storage: &Storage) -> Result<()> {
    storage
        .health_check()
        .await
        .context("Database health check failed")?;
    print_stats(storage).await
}

async fn print_stats(storage: &Storage) -> Result<()> {
    let stats = storage.stats().await?;
    info!("  Validators: {}", stats.validator_count);
    info!("  Score windows: {}", stats.score_count);
    info!("  Activity rows: {}", stats.activity_count);
    match stats.latest_epoch {
        Some(epoch) => info!("  Latest epoch: {}", epoch),
        None => info!("  Latest epoch: none"),
    }
    print_json(&stats)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = to_normalized_json(value).context("Failed to serialize output")?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
