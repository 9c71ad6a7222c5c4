//! Score storage operations.

use super::{ScoreRecord, Storage};
use anyhow::{Context, Result};
use nimiq_validators_core::ScoreValues;
use sqlx::Row;

impl Storage {
    /// Store a score, replacing any row for the same validator and window.
    ///
    /// The composite primary key `(validator_id, from_epoch, to_epoch)` is the
    /// conflict target, so concurrent writers end with exactly one row.
    pub async fn upsert_score(&self, score: &ScoreRecord) -> Result<()> {
        let reason = serde_json::to_string(&score.reason).context("Failed to serialize reason")?;

        sqlx::query(
            r#"
            INSERT INTO scores (
                validator_id, from_epoch, to_epoch,
                total, liveness, size, reliability, reason
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(validator_id, from_epoch, to_epoch) DO UPDATE SET
                total = excluded.total,
                liveness = excluded.liveness,
                size = excluded.size,
                reliability = excluded.reliability,
                reason = excluded.reason
            "#,
        )
        .bind(score.validator_id)
        .bind(score.from_epoch)
        .bind(score.to_epoch)
        .bind(score.values.total)
        .bind(score.values.liveness)
        .bind(score.values.size)
        .bind(score.values.reliability)
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("Failed to upsert score")?;

        Ok(())
    }

    /// All scores of a validator, most recent window first.
    pub async fn scores_for_validator(&self, validator_id: i64) -> Result<Vec<ScoreRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT validator_id, from_epoch, to_epoch,
                   total, liveness, size, reliability, reason
            FROM scores
            WHERE validator_id = ?
            ORDER BY to_epoch DESC, from_epoch DESC
            "#,
        )
        .bind(validator_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch scores")?;

        rows.into_iter().map(Self::row_to_score_record).collect()
    }

    fn row_to_score_record(row: sqlx::sqlite::SqliteRow) -> Result<ScoreRecord> {
        let reason: String = row.get("reason");

        Ok(ScoreRecord {
            validator_id: row.get("validator_id"),
            from_epoch: row.get("from_epoch"),
            to_epoch: row.get("to_epoch"),
            values: ScoreValues {
                total: row.get("total"),
                liveness: row.get("liveness"),
                size: row.get("size"),
                reliability: row.get("reliability"),
            },
            reason: serde_json::from_str(&reason).context("Invalid reason JSON in scores table")?,
        })
    }
}
