//! Derived display fields for validators.
//!
//! The icon and accent colour are required by the schema. Validators that
//! publish their own icon keep it, flagged as default only when the profile
//! says so; everyone else gets a deterministic identicon derived from the
//! address.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use nimiq_validators_core::{ValidatorAddress, ValidatorJson};
use sha2::{Digest, Sha256};

/// Display fields computed for a validator before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandingParameters {
    /// Icon data URI.
    pub icon: String,
    /// True when `icon` was generated.
    pub has_default_icon: bool,
    /// Accent colour as `#rrggbb`.
    pub accent_color: String,
}

/// Computes branding parameters for a validator profile.
#[async_trait]
pub trait BrandingProvider: Send + Sync {
    /// Resolve the icon and accent colour for `address`.
    async fn branding_parameters(
        &self,
        address: &ValidatorAddress,
        fields: &ValidatorJson,
    ) -> Result<BrandingParameters>;
}

/// Generates a 5x5 mirrored SVG identicon from the SHA-256 of the address.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdenticonBranding;

const GRID: usize = 5;
const CELL: usize = 8;

impl IdenticonBranding {
    /// Identicon SVG document for `address` drawn in `color`.
    pub fn identicon_svg(address: &ValidatorAddress, color: &str) -> String {
        let digest = Sha256::digest(address.as_str().as_bytes());
        let size = GRID * CELL;
        let mut svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {size} {size}"><rect width="{size}" height="{size}" fill="#f4f4f4"/>"##
        );

        // Left half plus middle column; the right half mirrors it
        for row in 0..GRID {
            for col in 0..GRID.div_ceil(2) {
                let bit = row * 3 + col;
                if digest[bit / 8] >> (bit % 8) & 1 == 0 {
                    continue;
                }
                for x in [col, GRID - 1 - col] {
                    svg.push_str(&format!(
                        r#"<rect x="{}" y="{}" width="{CELL}" height="{CELL}" fill="{color}"/>"#,
                        x * CELL,
                        row * CELL
                    ));
                    if x == GRID - 1 - x {
                        break;
                    }
                }
            }
        }
        svg.push_str("</svg>");
        svg
    }

    /// Accent colour derived from the address digest.
    pub fn derived_color(address: &ValidatorAddress) -> String {
        let digest = Sha256::digest(address.as_str().as_bytes());
        format!("#{}", hex::encode(&digest[29..32]))
    }
}

#[async_trait]
impl BrandingProvider for IdenticonBranding {
    async fn branding_parameters(
        &self,
        address: &ValidatorAddress,
        fields: &ValidatorJson,
    ) -> Result<BrandingParameters> {
        let accent_color = fields
            .accent_color
            .clone()
            .unwrap_or_else(|| Self::derived_color(address));

        if let Some(icon) = &fields.icon {
            return Ok(BrandingParameters {
                icon: icon.clone(),
                has_default_icon: fields.has_default_icon.unwrap_or(false),
                accent_color,
            });
        }

        let svg = Self::identicon_svg(address, &accent_color);
        let icon = format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(svg)
        );

        Ok(BrandingParameters {
            icon,
            has_default_icon: true,
            accent_color,
        })
    }
}
