//! Validator profile as published in JSON files and accepted by the store.

use serde::{Deserialize, Serialize};

use crate::types::{Fee, PayoutType};

/// Per-platform contact handles. Each field is validated independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Twitter / X handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    /// Telegram handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    /// Discord invitation link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_invitation_url: Option<String>,
    /// Bluesky handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bluesky: Option<String>,
    /// GitHub user or organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    /// LinkedIn handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    /// Facebook handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    /// Instagram handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    /// YouTube channel handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
}

/// A validator profile.
///
/// Deserialization only checks shapes and applies defaults; call
/// [`crate::validation::validate_validator`] for the field rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorJson {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Address as written in the file; checked by the validators, not by serde,
    /// so a bad address is reported together with any other failing field.
    pub address: String,

    /// Commission, `-1` when unset.
    #[serde(default)]
    pub fee: Fee,

    /// Reward distribution policy.
    #[serde(default)]
    pub payout_type: PayoutType,

    /// Free-text payout schedule.
    #[serde(default)]
    pub payout_schedule: String,

    /// Operated by the Nimiq team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_maintained_by_nimiq: Option<bool>,

    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Project website.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Custom icon as a base64 data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Marks a supplied `icon` as a stock image that listings hide unless
    /// identicons are requested. Absent means the icon is custom. Without an
    /// `icon` a generated one is used and only `true` (or absent) is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_default_icon: Option<bool>,

    /// Accent colour used by UIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,

    /// Contact handles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
}

impl ValidatorJson {
    /// A profile with every field at its default for `address`.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
            fee: Fee::default(),
            payout_type: PayoutType::default(),
            payout_schedule: String::new(),
            is_maintained_by_nimiq: None,
            description: None,
            website: None,
            icon: None,
            has_default_icon: None,
            accent_color: None,
            contact: None,
        }
    }
}
