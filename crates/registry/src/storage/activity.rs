//! Activity storage operations.

use super::{ActivityRecord, Storage};
use anyhow::{Context, Result};
use nimiq_validators_core::Balance;
use sqlx::Row;

impl Storage {
    /// Store an activity row, replacing any row for the same validator and epoch.
    pub async fn upsert_activity(&self, activity: &ActivityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity (
                validator_id, epoch_number, likelihood, rewarded, missed,
                size_ratio, size_ratio_via_slots, balance
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(validator_id, epoch_number) DO UPDATE SET
                likelihood = excluded.likelihood,
                rewarded = excluded.rewarded,
                missed = excluded.missed,
                size_ratio = excluded.size_ratio,
                size_ratio_via_slots = excluded.size_ratio_via_slots,
                balance = excluded.balance
            "#,
        )
        .bind(activity.validator_id)
        .bind(activity.epoch_number)
        .bind(activity.likelihood)
        .bind(activity.rewarded)
        .bind(activity.missed)
        .bind(activity.size_ratio)
        .bind(activity.size_ratio_via_slots)
        .bind(f64::from(activity.balance))
        .execute(&self.pool)
        .await
        .context("Failed to upsert activity")?;

        Ok(())
    }

    /// All activity rows recorded for `epoch_number`, ordered by validator id.
    pub async fn activity_for_epoch(&self, epoch_number: i64) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT validator_id, epoch_number, likelihood, rewarded, missed,
                   size_ratio, size_ratio_via_slots, balance
            FROM activity
            WHERE epoch_number = ?
            ORDER BY validator_id ASC
            "#,
        )
        .bind(epoch_number)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch activity")?;

        Ok(rows.into_iter().map(Self::row_to_activity_record).collect())
    }

    fn row_to_activity_record(row: sqlx::sqlite::SqliteRow) -> ActivityRecord {
        ActivityRecord {
            validator_id: row.get("validator_id"),
            epoch_number: row.get("epoch_number"),
            likelihood: row.get("likelihood"),
            rewarded: row.get("rewarded"),
            missed: row.get("missed"),
            size_ratio: row.get("size_ratio"),
            size_ratio_via_slots: row.get("size_ratio_via_slots"),
            balance: Balance::from(row.get::<f64, _>("balance")),
        }
    }
}
