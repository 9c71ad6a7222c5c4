//! # Nimiq Validators Core
//!
//! Domain types and field rules shared by the validators registry.
//!
//! ## Contents
//!
//! - **Types**: `ValidatorAddress`, `PayoutType`, `Fee`, `Balance`, `ScoreValues`
//! - **Profiles**: `ValidatorJson` and `Contact`, the published profile format
//! - **Validation**: named per-field rules aggregated into a `ValidationReport`
//! - **Constants**: sentinels and the address layout

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod json;
pub mod types;
pub mod validation;

pub use constants::*;
pub use error::{CoreError, Result};
pub use json::{Contact, ValidatorJson};
pub use types::*;
pub use validation::{validate_validator, FieldError, ValidationReport};
