//! Field rules for validator profiles.
//!
//! Every rule is a named function returning `Result<(), FieldError>`.
//! [`validate_validator`] runs all of them and reports every failing field.

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::json::{Contact, ValidatorJson};
use crate::types::{Fee, ValidatorAddress};

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> =
            Lazy::new(|| Regex::new($re).expect("validation pattern is a valid regex"));
    };
}

pattern!(EMAIL_RE, r"^[^\s@]+@[^\s@]+\.[^\s@]+$");
pattern!(TWITTER_RE, r"^@?\w{1,15}$");
pattern!(TELEGRAM_RE, r"^@?\w{5,32}$");
pattern!(BLUESKY_RE, r"^@?\w{1,32}$");
pattern!(GITHUB_RE, r"^@?[\w-]{1,39}$");
pattern!(LINKEDIN_RE, r"^@?\w{1,50}$");
pattern!(FACEBOOK_RE, r"^@?\w{1,50}$");
pattern!(INSTAGRAM_RE, r"^@?\w{1,30}$");
pattern!(YOUTUBE_RE, r"^@?\w{1,50}$");
pattern!(ICON_RE, r"^data:image/(png|svg\+xml|webp);base64,(.+)$");

/// A single failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, e.g. `contact.twitter`.
    pub field: String,
    /// Human readable reason.
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating a whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// All failing fields, in check order.
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    /// True when no field failed.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a `Result`, keeping the report as the error.
    pub fn into_result(self) -> Result<(), ValidationReport> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn record(&mut self, outcome: Result<(), FieldError>) {
        if let Err(e) = outcome {
            self.errors.push(e);
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationReport {}

/// `address` must follow the Nimiq address layout.
pub fn validate_address(address: &str) -> Result<(), FieldError> {
    if ValidatorAddress::is_valid(address) {
        Ok(())
    } else {
        Err(FieldError::new("address", "Invalid Nimiq address format"))
    }
}

/// `fee` must be `-1` or within `[0, 1]`.
pub fn validate_fee(fee: &Fee) -> Result<(), FieldError> {
    if fee.is_valid() {
        Ok(())
    } else {
        Err(FieldError::new("fee", "must be -1 or between 0 and 1"))
    }
}

/// `website` must be an absolute URL.
pub fn validate_website(website: &str) -> Result<(), FieldError> {
    validate_url("website", website)
}

/// `icon` must be a base64 data URI of a png, svg or webp image.
pub fn validate_icon(icon: &str) -> Result<(), FieldError> {
    let payload = ICON_RE
        .captures(icon)
        .and_then(|c| c.get(2))
        .ok_or_else(|| FieldError::new("icon", "must be a png, svg or webp base64 data URI"))?;

    base64::engine::general_purpose::STANDARD
        .decode(payload.as_str())
        .map(|_| ())
        .map_err(|e| FieldError::new("icon", format!("invalid base64 payload: {}", e)))
}

/// `hasDefaultIcon: false` claims a custom icon, so it needs an `icon`.
pub fn validate_has_default_icon(
    icon: Option<&str>,
    has_default_icon: Option<bool>,
) -> Result<(), FieldError> {
    if icon.is_none() && has_default_icon == Some(false) {
        return Err(FieldError::new(
            "hasDefaultIcon",
            "cannot be false when no icon is supplied",
        ));
    }
    Ok(())
}

/// `contact.email` must look like an email address.
pub fn validate_email(email: &str) -> Result<(), FieldError> {
    check_pattern("contact.email", email, &EMAIL_RE)
}

/// `contact.twitter`: X handle, up to 15 word characters.
pub fn validate_twitter(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.twitter", handle, &TWITTER_RE)
}

/// `contact.telegram`: 5 to 32 word characters.
pub fn validate_telegram(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.telegram", handle, &TELEGRAM_RE)
}

/// `contact.discordInvitationUrl` must be an absolute URL.
pub fn validate_discord_invitation_url(url: &str) -> Result<(), FieldError> {
    validate_url("contact.discordInvitationUrl", url)
}

/// `contact.bluesky`: up to 32 word characters.
pub fn validate_bluesky(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.bluesky", handle, &BLUESKY_RE)
}

/// `contact.github`: up to 39 word characters or dashes.
pub fn validate_github(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.github", handle, &GITHUB_RE)
}

/// `contact.linkedin`: up to 50 word characters.
pub fn validate_linkedin(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.linkedin", handle, &LINKEDIN_RE)
}

/// `contact.facebook`: up to 50 word characters.
pub fn validate_facebook(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.facebook", handle, &FACEBOOK_RE)
}

/// `contact.instagram`: up to 30 word characters.
pub fn validate_instagram(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.instagram", handle, &INSTAGRAM_RE)
}

/// `contact.youtube`: up to 50 word characters.
pub fn validate_youtube(handle: &str) -> Result<(), FieldError> {
    check_pattern("contact.youtube", handle, &YOUTUBE_RE)
}

/// Run every contact rule that applies to a present field.
pub fn validate_contact(contact: &Contact) -> Vec<FieldError> {
    let checks: [(&Option<String>, fn(&str) -> Result<(), FieldError>); 10] = [
        (&contact.email, validate_email),
        (&contact.twitter, validate_twitter),
        (&contact.telegram, validate_telegram),
        (&contact.discord_invitation_url, validate_discord_invitation_url),
        (&contact.bluesky, validate_bluesky),
        (&contact.github, validate_github),
        (&contact.linkedin, validate_linkedin),
        (&contact.facebook, validate_facebook),
        (&contact.instagram, validate_instagram),
        (&contact.youtube, validate_youtube),
    ];

    checks
        .into_iter()
        .filter_map(|(value, check)| value.as_deref().map(check))
        .filter_map(Result::err)
        .collect()
}

/// Validate a full profile, collecting every failing field.
pub fn validate_validator(validator: &ValidatorJson) -> ValidationReport {
    let mut report = ValidationReport::default();

    report.record(validate_address(&validator.address));
    report.record(validate_fee(&validator.fee));
    if let Some(website) = validator.website.as_deref() {
        report.record(validate_website(website));
    }
    if let Some(icon) = validator.icon.as_deref() {
        report.record(validate_icon(icon));
    }
    report.record(validate_has_default_icon(
        validator.icon.as_deref(),
        validator.has_default_icon,
    ));
    if let Some(contact) = &validator.contact {
        report.errors.extend(validate_contact(contact));
    }

    report
}

fn check_pattern(field: &str, value: &str, re: &Regex) -> Result<(), FieldError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(FieldError::new(field, format!("invalid value {:?}", value)))
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), FieldError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| FieldError::new(field, format!("invalid URL: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "NQ37 6EL5 BP9K XL1A 3ED0 L3EC NPR5 C9D3 BRKG";

    #[test]
    fn test_valid_profile_passes() {
        let mut json = ValidatorJson::with_address(ADDRESS);
        json.website = Some("https://nimiq.com".to_string());
        json.icon = Some("data:image/png;base64,iVBORw0KGgo=".to_string());
        json.contact = Some(Contact {
            email: Some("team@nimiq.com".to_string()),
            twitter: Some("@nimiq".to_string()),
            github: Some("nimiq-dev".to_string()),
            ..Default::default()
        });

        let report = validate_validator(&json);
        assert!(report.is_valid(), "{}", report);
    }

    #[test]
    fn test_reports_every_failing_field() {
        let mut json = ValidatorJson::with_address("NQ00 BAD");
        json.fee = Fee::Rate(2.0);
        json.website = Some("not a url".to_string());
        json.contact = Some(Contact {
            twitter: Some("this_handle_is_way_too_long".to_string()),
            telegram: Some("abc".to_string()),
            ..Default::default()
        });

        let report = validate_validator(&json);
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "address",
                "fee",
                "website",
                "contact.twitter",
                "contact.telegram"
            ]
        );
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_icon_rules() {
        assert!(validate_icon("data:image/webp;base64,UklGRg==").is_ok());
        assert!(validate_icon("data:image/svg+xml;base64,PHN2Zy8+").is_ok());
        assert!(validate_icon("data:image/gif;base64,R0lGOD==").is_err());
        assert!(validate_icon("data:image/png;base64,***").is_err());
        assert!(validate_icon("https://example.com/icon.png").is_err());
    }

    #[test]
    fn test_has_default_icon_needs_icon_when_false() {
        let mut json = ValidatorJson::with_address(ADDRESS);
        json.has_default_icon = Some(false);
        let report = validate_validator(&json);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "hasDefaultIcon");

        json.icon = Some("data:image/png;base64,iVBORw0KGgo=".to_string());
        assert!(validate_validator(&json).is_valid());

        json.icon = None;
        json.has_default_icon = Some(true);
        assert!(validate_validator(&json).is_valid());
    }

    #[test]
    fn test_contact_handles() {
        assert!(validate_github("some-org").is_ok());
        assert!(validate_linkedin("some-org").is_err());
        assert!(validate_telegram("@nimiq_network").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_discord_invitation_url("https://discord.gg/x").is_ok());
    }
}
