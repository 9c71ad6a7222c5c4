//! Database types for the registry storage layer.

use nimiq_validators_core::{Balance, Contact, Fee, PayoutType, ScoreValues};
use serde::{Deserialize, Serialize};

/// Column values written for a validator on insert or upsert.
///
/// `icon` and `accent_color` are required by the schema, so a record is only
/// built after branding parameters have been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewValidator {
    /// Display name; `None` stores the unknown-validator marker.
    pub name: Option<String>,

    /// Free-text description.
    pub description: Option<String>,

    /// Commission.
    pub fee: Fee,

    /// Reward distribution policy.
    pub payout_type: PayoutType,

    /// Free-text payout schedule.
    pub payout_schedule: Option<String>,

    /// Operated by the Nimiq team.
    pub is_maintained_by_nimiq: bool,

    /// Icon data URI.
    pub icon: String,

    /// True when `icon` was generated rather than supplied.
    pub has_default_icon: bool,

    /// Accent colour.
    pub accent_color: String,

    /// Project website.
    pub website: Option<String>,

    /// Contact handles, stored as JSON.
    pub contact: Option<Contact>,
}

/// A validator row as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorRecord {
    /// Surrogate key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Unique address.
    pub address: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Commission.
    pub fee: Fee,
    /// Reward distribution policy.
    pub payout_type: PayoutType,
    /// Free-text payout schedule.
    pub payout_schedule: Option<String>,
    /// Operated by the Nimiq team.
    pub is_maintained_by_nimiq: bool,
    /// Icon data URI.
    pub icon: String,
    /// True when `icon` was generated.
    pub has_default_icon: bool,
    /// Accent colour.
    pub accent_color: String,
    /// Project website.
    pub website: Option<String>,
    /// Contact handles.
    pub contact: Option<Contact>,
}

/// Score for one validator over the window `[from_epoch, to_epoch]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    /// Validator foreign key.
    pub validator_id: i64,
    /// First epoch of the window.
    pub from_epoch: i64,
    /// Last epoch of the window.
    pub to_epoch: i64,
    /// Score components.
    #[serde(flatten)]
    pub values: ScoreValues,
    /// Explanation produced by the scoring pipeline.
    pub reason: serde_json::Value,
}

/// Participation of one validator in one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Validator foreign key.
    pub validator_id: i64,
    /// Epoch number.
    pub epoch_number: i64,
    /// Expected slot likelihood.
    pub likelihood: i64,
    /// Rewarded slots.
    pub rewarded: i64,
    /// Missed slots.
    pub missed: i64,
    /// Share of stake or slots.
    pub size_ratio: i64,
    /// True when `size_ratio` was derived from slots instead of stake.
    pub size_ratio_via_slots: bool,
    /// Stake balance.
    pub balance: Balance,
}
