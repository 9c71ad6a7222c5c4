//! Validator registry and score data-access layer.
//!
//! This crate provides:
//! - SQLite storage for validators, score windows and per-epoch activity
//! - A write path that validates addresses, caches ids and resolves branding
//! - Listing and score queries composed from independent clauses
//! - Bulk import of validator profiles from a folder of JSON files
//!
//! # Architecture
//!
//! ```text
//!   validator JSON files
//!           │
//!   ┌───────▼────────┐
//!   │ BatchImporter  │  validate all, then bounded concurrent upserts
//!   └───────┬────────┘
//!           │
//!   ┌───────▼────────┐     ┌──────────────────┐
//!   │ ValidatorStore │────►│ BrandingProvider │
//!   │ + AddressCache │     └──────────────────┘
//!   └───────┬────────┘
//!           │ ValidatorRepository
//!   ┌───────▼────────┐
//!   │    Storage     │ ← SQLite (validators, scores, activity)
//!   └───────▲────────┘
//!           │
//!   ┌───────┴────────┐
//!   │   ScoreQuery   │  listings and latest scores
//!   └────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branding;
pub mod cache;
pub mod config;
pub mod importer;
pub mod query;
pub mod storage;
pub mod store;

pub use branding::{BrandingParameters, BrandingProvider, IdenticonBranding};
pub use cache::AddressCache;
pub use importer::{BatchImporter, ImportError, ImportFailure, ImportSummary};
pub use query::{
    normalize_nulls, to_normalized_json, FetchOptions, FetchedValidator, QueryError, ScoreQuery,
    ValidatorScore,
};
pub use storage::Storage;
pub use store::{StoreError, StoreOptions, ValidatorRepository, ValidatorStore};

pub use nimiq_validators_core::{types::*, *};
