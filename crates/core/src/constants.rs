//! Shared constants.

/// Name given to validators that never published a profile.
///
/// Listing queries treat any name containing this marker (case-insensitive)
/// as an unknown validator.
pub const UNKNOWN_VALIDATOR_NAME: &str = "Unknown validator";

/// Stored value for a fee that was never set.
pub const FEE_UNSET: f64 = -1.0;

/// Stored value for a balance that could not be determined.
pub const BALANCE_UNKNOWN: f64 = -1.0;

/// Suffix reserved for documentation templates in import folders.
pub const EXAMPLE_FILE_SUFFIX: &str = ".example.json";

/// Address layout: `NQ`, two check digits, eight space separated groups of four.
pub const ADDRESS_PATTERN: &str = r"^NQ[0-9]{2}( [0-9A-Za-z]{4}){8}$";
