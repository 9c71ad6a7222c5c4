//! Configuration management for the validators registry.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables referenced as `${VAR_NAME}` inside the file
//! - Default values (fallbacks)

use anyhow::{Context, Result};
use nimiq_validators_core::ValidatorAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::importer::DEFAULT_MAX_IN_FLIGHT;

/// Main configuration for the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Write path configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Batch import configuration
    #[serde(default)]
    pub import: ImportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://validators.db")
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Write path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Only these addresses may be written. Empty allows every address.
    #[serde(default)]
    pub allowed_addresses: Vec<String>,
}

/// Batch import configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Folder used by `import` when none is given on the command line
    #[serde(default)]
    pub folder: Option<String>,

    /// Maximum number of concurrent writes
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_database_url() -> String {
    "sqlite://validators.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            folder: None,
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `url = "${VALIDATORS_DATABASE_URL}"`
    ///
    /// # Example
    /// ```no_run
    /// # use nimiq_validators_registry::config::Config;
    /// let config = Config::from_file("registry.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        for address in &self.store.allowed_addresses {
            ValidatorAddress::new(address.as_str())
                .with_context(|| format!("Store allowed_addresses entry {:?} is invalid", address))?;
        }

        if self.import.max_in_flight == 0 {
            anyhow::bail!("Import max_in_flight must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

/// Lexical context of the TOML scanner in [`expand_env_vars`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Comment,
    Basic,
    Literal,
    MultilineBasic,
    MultilineLiteral,
}

/// Replace every `${VAR_NAME}` with the value of the environment variable.
///
/// Placeholders are expanded in values and inside every kind of TOML string.
/// Anything after a `#` that is not inside a string is a comment and is
/// copied verbatim, whether it fills the line or follows a value.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut state = Scan::Code;
    let mut line = 1;
    let mut rest = input;

    while let Some(ch) = rest.chars().next() {
        if state != Scan::Comment && rest.starts_with("${") {
            let after = &rest[2..];
            let end = after
                .find(|c: char| c == '}' || c == '\n')
                .filter(|&end| after[end..].starts_with('}'))
                .with_context(|| {
                    format!("Unclosed environment variable reference on line {}", line)
                })?;
            let name = &after[..end];
            if name.is_empty() {
                anyhow::bail!("Empty environment variable name on line {}", line);
            }
            let value = std::env::var(name)
                .with_context(|| format!("Environment variable {} is not set", name))?;
            output.push_str(&value);
            rest = &after[end + 1..];
            continue;
        }

        let mut step = ch.len_utf8();
        state = match (state, ch) {
            (Scan::Code, '#') => Scan::Comment,
            (Scan::Code, '"') if rest.starts_with("\"\"\"") => {
                step = 3;
                Scan::MultilineBasic
            }
            (Scan::Code, '"') => Scan::Basic,
            (Scan::Code, '\'') if rest.starts_with("'''") => {
                step = 3;
                Scan::MultilineLiteral
            }
            (Scan::Code, '\'') => Scan::Literal,
            (Scan::Comment, '\n') => Scan::Code,
            (Scan::Basic | Scan::MultilineBasic, '\\') => {
                // The escaped character never opens or closes anything
                step += rest[1..].chars().next().map_or(0, char::len_utf8);
                state
            }
            (Scan::Basic, '"' | '\n') | (Scan::Literal, '\'' | '\n') => Scan::Code,
            (Scan::MultilineBasic, '"') if rest.starts_with("\"\"\"") => {
                step = 3;
                Scan::Code
            }
            (Scan::MultilineLiteral, '\'') if rest.starts_with("'''") => {
                step = 3;
                Scan::Code
            }
            (state, _) => state,
        };

        let consumed = &rest[..step];
        line += consumed.matches('\n').count();
        output.push_str(consumed);
        rest = &rest[step..];
    }

    Ok(output)
}
