//! Bulk import of validator profiles from a folder of JSON files.
//!
//! Import runs in two phases. Every candidate file is first parsed,
//! validated and checked against its file name; the first bad file aborts
//! the whole batch before anything is written. The validated profiles are
//! then upserted with bounded concurrency and every write failure is
//! collected into a single [`ImportError::AggregateWrite`].

use futures::StreamExt;
use nimiq_validators_core::{validate_validator, ValidatorJson, EXAMPLE_FILE_SUFFIX};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{StoreError, StoreOptions, ValidatorStore};

/// Default number of concurrent writes during import.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// A single record that failed to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    /// File the record came from.
    pub file: String,
    /// Why the write failed.
    pub error: StoreError,
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.error)
    }
}

/// Why an import did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The folder or a file could not be read.
    #[error("Failed to read {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        message: String,
    },

    /// A file is not valid JSON.
    #[error("Invalid JSON in file: {file}. Error: {message}")]
    InvalidJson {
        /// File name.
        file: String,
        /// Parser error.
        message: String,
    },

    /// A file does not satisfy the validator schema.
    #[error("Invalid file: {file}. Error: {message}")]
    InvalidFile {
        /// File name.
        file: String,
        /// Every failing field.
        message: String,
    },

    /// The `address` inside a file differs from its file name.
    #[error("Address mismatch in file: {file}")]
    AddressMismatch {
        /// File name.
        file: String,
    },

    /// One or more validated records could not be written.
    #[error("There were errors while importing the validators: {}", format_failures(.failures))]
    AggregateWrite {
        /// Every failed write, ordered by file name.
        failures: Vec<ImportFailure>,
        /// Number of records that were written.
        stored: usize,
    },
}

fn format_failures(failures: &[ImportFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Stored id per address.
    pub ids: BTreeMap<String, i64>,
}

impl ImportSummary {
    /// Number of imported validators.
    pub fn imported(&self) -> usize {
        self.ids.len()
    }
}

/// Imports validator profiles through a [`ValidatorStore`].
#[derive(Clone)]
pub struct BatchImporter {
    store: ValidatorStore,
    max_in_flight: usize,
}

impl BatchImporter {
    /// Create an importer writing through `store`.
    pub fn new(store: ValidatorStore) -> Self {
        Self {
            store,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Cap the number of concurrent writes. Zero is treated as one.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Import every `*.json` file in `folder`, skipping `*.example.json`.
    ///
    /// Meant for seeding the database: any malformed file aborts the import
    /// before the first write.
    pub async fn import_validators_from_files(
        &self,
        folder: impl AsRef<Path>,
    ) -> Result<ImportSummary, ImportError> {
        let folder = folder.as_ref();
        let files = list_candidate_files(folder).await?;
        info!(
            "Importing {} validator files from {}",
            files.len(),
            folder.display()
        );

        let mut validators = Vec::with_capacity(files.len());
        for (file, path) in files {
            let validator = load_validator_file(&file, &path).await?;
            validators.push((file, validator));
        }

        let results: Vec<(String, String, Result<i64, StoreError>)> =
            futures::stream::iter(validators)
                .map(|(file, validator)| {
                    let store = self.store.clone();
                    async move {
                        let result = store
                            .store_validator(&validator.address, &validator, StoreOptions::upsert())
                            .await;
                        (file, validator.address, result)
                    }
                })
                .buffer_unordered(self.max_in_flight)
                .collect()
                .await;

        let mut summary = ImportSummary::default();
        let mut failures = Vec::new();
        for (file, address, result) in results {
            match result {
                Ok(id) => {
                    summary.ids.insert(address, id);
                }
                Err(error) => failures.push(ImportFailure { file, error }),
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.file.cmp(&b.file));
            warn!(
                "{} of {} validators failed to import",
                failures.len(),
                failures.len() + summary.imported()
            );
            return Err(ImportError::AggregateWrite {
                failures,
                stored: summary.imported(),
            });
        }

        info!("Imported {} validators", summary.imported());
        Ok(summary)
    }
}

/// `(file name, path)` of every import candidate, sorted by name.
async fn list_candidate_files(folder: &Path) -> Result<Vec<(String, PathBuf)>, ImportError> {
    let io_error = |e: std::io::Error| ImportError::Io {
        path: folder.display().to_string(),
        message: e.to_string(),
    };

    let mut entries = tokio::fs::read_dir(folder).await.map_err(io_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if is_json && !name.ends_with(EXAMPLE_FILE_SUFFIX) && path.is_file() {
            files.push((name, path));
        }
    }

    files.sort();
    Ok(files)
}

/// Parse, validate and check the name of one file.
async fn load_validator_file(file: &str, path: &Path) -> Result<ValidatorJson, ImportError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ImportError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let json: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ImportError::InvalidJson {
            file: file.to_string(),
            message: e.to_string(),
        })?;

    let validator: ValidatorJson =
        serde_json::from_value(json).map_err(|e| ImportError::InvalidFile {
            file: file.to_string(),
            message: e.to_string(),
        })?;

    validate_validator(&validator)
        .into_result()
        .map_err(|report| ImportError::InvalidFile {
            file: file.to_string(),
            message: report.to_string(),
        })?;

    let file_address = file.strip_suffix(".json").unwrap_or(file);
    if validator.address != file_address {
        return Err(ImportError::AddressMismatch {
            file: file.to_string(),
        });
    }

    Ok(validator)
}
