//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Address does not follow the `NQxx XXXX ... XXXX` layout.
    #[error("Invalid Nimiq address format: {0:?}")]
    InvalidAddress(String),

    /// Unknown payout type literal.
    #[error("Invalid payout type: {0:?} (must be one of none, restake, direct)")]
    InvalidPayoutType(String),

    /// Fee outside `[0, 1]` and not the `-1` sentinel.
    #[error("Invalid fee: {0} (must be -1 or between 0 and 1)")]
    InvalidFee(f64),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
