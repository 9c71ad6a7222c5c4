//! Core types for the validators registry.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{ADDRESS_PATTERN, BALANCE_UNKNOWN, FEE_UNSET};
use crate::error::CoreError;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(ADDRESS_PATTERN).expect("address pattern is a valid regex"));

/// A validator address in user-friendly Nimiq format.
///
/// Construction and deserialization both validate the layout, so a value of
/// this type always matches `NQxx XXXX XXXX XXXX XXXX XXXX XXXX XXXX XXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidatorAddress(String);

impl ValidatorAddress {
    /// Parse and validate an address.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if !Self::is_valid(&value) {
            return Err(CoreError::InvalidAddress(value));
        }
        Ok(ValidatorAddress(value))
    }

    /// Whether `value` follows the address layout.
    pub fn is_valid(value: &str) -> bool {
        ADDRESS_RE.is_match(value)
    }

    /// Borrow the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ValidatorAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValidatorAddress::new(s)
    }
}

impl AsRef<str> for ValidatorAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ValidatorAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValidatorAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        ValidatorAddress::new(value).map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}

/// Reward distribution policy of a validator.
///
/// [`PayoutType::ALL`] is the single list of accepted values; the storage
/// check constraint is verified against it at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutType {
    /// No automatic payout.
    #[default]
    None,
    /// Rewards are restaked.
    Restake,
    /// Rewards are paid out to stakers.
    Direct,
}

impl PayoutType {
    /// Every payout type, in declaration order.
    pub const ALL: [PayoutType; 3] = [PayoutType::None, PayoutType::Restake, PayoutType::Direct];

    /// Storage literal for this payout type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PayoutType::None => "none",
            PayoutType::Restake => "restake",
            PayoutType::Direct => "direct",
        }
    }

    /// SQL check expression restricting `column` to the accepted literals.
    pub fn check_expression(column: &str) -> String {
        let values = Self::ALL
            .iter()
            .map(|p| format!("'{}'", p.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} IN ({})", column, values)
    }
}

impl fmt::Display for PayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::InvalidPayoutType(s.to_string()))
    }
}

/// Validator commission.
///
/// The wire and storage form is a plain number where `-1` marks an unset
/// fee, so `Unset` and `Rate(0.0)` never collapse into each other.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum Fee {
    /// No fee published.
    #[default]
    Unset,
    /// Fee as a fraction of rewards.
    Rate(f64),
}

impl Fee {
    /// Build a fee, rejecting values outside `[0, 1]` other than the sentinel.
    pub fn new(value: f64) -> Result<Self, CoreError> {
        let fee = Fee::from(value);
        if !fee.is_valid() {
            return Err(CoreError::InvalidFee(value));
        }
        Ok(fee)
    }

    /// Whether the fee is the sentinel or lies in `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        match self {
            Fee::Unset => true,
            Fee::Rate(rate) => (0.0..=1.0).contains(rate),
        }
    }

    /// The rate, if one was set.
    pub fn rate(&self) -> Option<f64> {
        match self {
            Fee::Unset => None,
            Fee::Rate(rate) => Some(*rate),
        }
    }
}

impl From<f64> for Fee {
    fn from(value: f64) -> Self {
        if value == FEE_UNSET {
            Fee::Unset
        } else {
            Fee::Rate(value)
        }
    }
}

impl From<Fee> for f64 {
    fn from(fee: Fee) -> Self {
        match fee {
            Fee::Unset => FEE_UNSET,
            Fee::Rate(rate) => rate,
        }
    }
}

/// Stake balance recorded with an activity row; `-1` in storage means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum Balance {
    /// Balance could not be determined.
    #[default]
    Unknown,
    /// Known balance.
    Known(f64),
}

impl Balance {
    /// The amount, if known.
    pub fn amount(&self) -> Option<f64> {
        match self {
            Balance::Unknown => None,
            Balance::Known(amount) => Some(*amount),
        }
    }
}

impl From<f64> for Balance {
    fn from(value: f64) -> Self {
        if value == BALANCE_UNKNOWN {
            Balance::Unknown
        } else {
            Balance::Known(value)
        }
    }
}

impl From<Balance> for f64 {
    fn from(balance: Balance) -> Self {
        match balance {
            Balance::Unknown => BALANCE_UNKNOWN,
            Balance::Known(amount) => amount,
        }
    }
}

/// Score components produced by the scoring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreValues {
    /// Aggregate score.
    pub total: f64,
    /// Liveness component.
    pub liveness: f64,
    /// Size component.
    pub size: f64,
    /// Reliability component.
    pub reliability: f64,
}
