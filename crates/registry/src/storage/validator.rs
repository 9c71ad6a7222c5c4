//! Validator storage operations.

use super::{NewValidator, Storage, ValidatorRecord};
use anyhow::{Context, Result};
use nimiq_validators_core::{Fee, PayoutType, UNKNOWN_VALIDATOR_NAME};
use sqlx::Row;

const INSERT_COLUMNS: &str = r#"
    INSERT INTO validators (
        name, address, description, fee, payout_type, payout_schedule,
        is_maintained_by_nimiq, icon, has_default_icon, accent_color,
        website, contact
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, address, description, fee, payout_type, payout_schedule,
           is_maintained_by_nimiq, icon, has_default_icon, accent_color,
           website, contact
    FROM validators
"#;

/// Bind the `INSERT_COLUMNS` placeholders in order.
macro_rules! bind_validator {
    ($query:expr, $address:expr, $record:expr, $contact:expr) => {
        $query
            .bind($record.name.as_deref().unwrap_or(UNKNOWN_VALIDATOR_NAME))
            .bind($address)
            .bind($record.description.as_deref())
            .bind(f64::from($record.fee))
            .bind($record.payout_type.as_str())
            .bind($record.payout_schedule.as_deref())
            .bind($record.is_maintained_by_nimiq)
            .bind($record.icon.as_str())
            .bind($record.has_default_icon)
            .bind($record.accent_color.as_str())
            .bind($record.website.as_deref())
            .bind($contact)
    };
}

impl Storage {
    /// Look up the id of the validator with `address`.
    pub async fn find_validator_id(&self, address: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM validators WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up validator id")?;

        Ok(id)
    }

    /// Insert a validator unless one with `address` exists, returning the id either way.
    ///
    /// The unique index on `address` decides the race between concurrent
    /// writers; the loser rereads the winner's id.
    pub async fn insert_validator_or_get(
        &self,
        address: &str,
        record: &NewValidator,
    ) -> Result<i64> {
        let contact = contact_json(record)?;
        let sql = format!("{} ON CONFLICT(address) DO NOTHING RETURNING id", INSERT_COLUMNS);

        let inserted = bind_validator!(sqlx::query_scalar::<_, i64>(&sql), address, record, contact.as_deref())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to insert validator {}", address))?;

        match inserted {
            Some(id) => Ok(id),
            None => self
                .find_validator_id(address)
                .await?
                .with_context(|| format!("Validator {} vanished after insert conflict", address)),
        }
    }

    /// Insert or update the validator with `address` in one statement.
    ///
    /// An existing row keeps its id, so scores and activity stay attached.
    pub async fn upsert_validator(&self, address: &str, record: &NewValidator) -> Result<i64> {
        let contact = contact_json(record)?;
        let sql = format!(
            r#"{}
            ON CONFLICT(address) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                fee = excluded.fee,
                payout_type = excluded.payout_type,
                payout_schedule = excluded.payout_schedule,
                is_maintained_by_nimiq = excluded.is_maintained_by_nimiq,
                icon = excluded.icon,
                has_default_icon = excluded.has_default_icon,
                accent_color = excluded.accent_color,
                website = excluded.website,
                contact = excluded.contact
            RETURNING id"#,
            INSERT_COLUMNS
        );

        let id = bind_validator!(sqlx::query_scalar::<_, i64>(&sql), address, record, contact.as_deref())
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert validator {}", address))?;

        Ok(id)
    }

    /// Get a validator by id.
    pub async fn get_validator(&self, id: i64) -> Result<Option<ValidatorRecord>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch validator")?;

        row.map(Self::row_to_validator_record).transpose()
    }

    /// Get a validator by address.
    pub async fn get_validator_by_address(&self, address: &str) -> Result<Option<ValidatorRecord>> {
        let sql = format!("{} WHERE address = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch validator")?;

        row.map(Self::row_to_validator_record).transpose()
    }

    /// Delete a validator together with its scores and activity.
    ///
    /// Returns false if no such validator existed.
    pub async fn delete_validator(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM validators WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete validator")?;

        Ok(result.rows_affected() > 0)
    }

    /// Return the addresses from `addresses` that have no validator row.
    ///
    /// Scores can only be computed for stored validators, so callers use this
    /// to find who must be stored before fetching activity for an epoch range.
    pub async fn find_missing_validators(&self, addresses: &[String]) -> Result<Vec<String>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = String::from("SELECT address FROM validators WHERE address IN (");
        query.push_str(
            &std::iter::repeat_n("?", addresses.len())
                .collect::<Vec<_>>()
                .join(","),
        );
        query.push(')');

        let mut stmt = sqlx::query_scalar::<_, String>(&query);
        for address in addresses {
            stmt = stmt.bind(address);
        }
        let existing = stmt
            .fetch_all(&self.pool)
            .await
            .context("Failed to look up existing validators")?;

        Ok(addresses
            .iter()
            .filter(|a| !existing.contains(a))
            .cloned()
            .collect())
    }

    /// Count stored validators.
    pub async fn count_validators(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM validators")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    fn row_to_validator_record(row: sqlx::sqlite::SqliteRow) -> Result<ValidatorRecord> {
        let payout_type = row
            .get::<Option<String>, _>("payout_type")
            .map(|p| p.parse::<PayoutType>())
            .transpose()?
            .unwrap_or_default();
        let contact = row
            .get::<Option<String>, _>("contact")
            .map(|c| serde_json::from_str(&c))
            .transpose()
            .context("Invalid contact JSON in validators table")?;

        Ok(ValidatorRecord {
            id: row.get("id"),
            name: row.get("name"),
            address: row.get("address"),
            description: row.get("description"),
            fee: row.get::<Option<f64>, _>("fee").map(Fee::from).unwrap_or_default(),
            payout_type,
            payout_schedule: row.get("payout_schedule"),
            is_maintained_by_nimiq: row
                .get::<Option<bool>, _>("is_maintained_by_nimiq")
                .unwrap_or(false),
            icon: row.get("icon"),
            has_default_icon: row.get("has_default_icon"),
            accent_color: row.get("accent_color"),
            website: row.get("website"),
            contact,
        })
    }
}

fn contact_json(record: &NewValidator) -> Result<Option<String>> {
    record
        .contact
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize contact")
}
