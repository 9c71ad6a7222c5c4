//! Storage layer for the validators registry.
//!
//! This module provides database operations for:
//! - Validators (identity, payout policy and branding, unique by address)
//! - Scores (one row per validator and epoch window)
//! - Activity (one row per validator and epoch)

use anyhow::{Context, Result};
use nimiq_validators_core::PayoutType;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod activity;
pub mod score;
pub mod types;
pub mod validator;

pub use types::*;

/// Database storage for the registry.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist. Foreign keys are
    /// enabled on every connection so deletes cascade to scores and activity.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://validators.db")
    /// * `max_connections` - Pool upper bound (defaults to 5)
    /// * `min_connections` - Pool lower bound (defaults to 1)
    ///
    /// # Example
    /// ```no_run
    /// # use nimiq_validators_registry::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://validators.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations and check the payout type constraint.
    ///
    /// This should be called once during initialization to ensure the schema is up to date.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        self.verify_payout_type_constraint().await?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Fail if the `payout_type` check constraint accepts a different set of
    /// values than [`PayoutType::ALL`].
    pub async fn verify_payout_type_constraint(&self) -> Result<()> {
        let ddl: String = sqlx::query_scalar(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'validators'",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to read validators table definition")?;

        let stored = parse_check_values(&ddl, "payout_type")
            .context("validators table has no payout_type check constraint")?;
        let expected: BTreeSet<String> = PayoutType::ALL
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();

        if stored != expected {
            anyhow::bail!(
                "payout_type check constraint {:?} does not match PayoutType values {:?}",
                stored,
                expected
            );
        }

        Ok(())
    }

    /// Get a reference to the connection pool.
    ///
    /// This is useful for custom queries or transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let validator_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM validators")
            .fetch_one(&self.pool)
            .await?;

        let score_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores")
            .fetch_one(&self.pool)
            .await?;

        let activity_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity")
            .fetch_one(&self.pool)
            .await?;

        let latest_epoch: Option<i64> = sqlx::query_scalar("SELECT MAX(epoch_number) FROM activity")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            validator_count: validator_count as u64,
            score_count: score_count as u64,
            activity_count: activity_count as u64,
            latest_epoch,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Extract the literals of `<column> IN ('a', 'b')` from a table definition.
fn parse_check_values(ddl: &str, column: &str) -> Option<BTreeSet<String>> {
    let marker = format!("{} IN (", column);
    let start = ddl.find(&marker)? + marker.len();
    let end = start + ddl[start..].find(')')?;

    Some(
        ddl[start..end]
            .split(',')
            .map(|v| v.trim().trim_matches('\'').to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    /// Total number of validators
    pub validator_count: u64,

    /// Total number of score rows
    pub score_count: u64,

    /// Total number of activity rows
    pub activity_count: u64,

    /// Highest epoch with recorded activity
    pub latest_epoch: Option<i64>,
}
