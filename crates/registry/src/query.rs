//! Read path: validator listings and score lookups.
//!
//! Listing queries are assembled from [`FetchOptions`]. Each option maps to
//! exactly one [`Filter`], [`Join`] or [`Projection`] clause, and the clauses
//! are rendered independently, so no combination of options needs special
//! handling.
//!
//! Both read operations return `Result<_, QueryError>` values and never
//! panic on storage failures; an empty vector means "no match", an error
//! means the query itself failed.

use nimiq_validators_core::{
    Balance, Fee, PayoutType, ScoreValues, UNKNOWN_VALIDATOR_NAME,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error};

use crate::storage::Storage;

/// Latest window per validator: highest `to_epoch`, then highest `from_epoch`.
const LATEST_SCORES_CTE: &str = r#"
WITH latest_scores AS (
    SELECT validator_id, from_epoch, to_epoch, total, liveness, size, reliability,
           ROW_NUMBER() OVER (
               PARTITION BY validator_id
               ORDER BY to_epoch DESC, from_epoch DESC
           ) AS rn
    FROM scores
)
"#;

/// Missing totals sort last; equal totals fall back to ascending id.
const SCORE_ORDER: &str = " ORDER BY (s.total IS NULL) ASC, s.total DESC, v.id ASC";

/// Read-path failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The storage layer failed to run the query.
    #[error("Error fetching validators: {0}")]
    Storage(String),

    /// A query option could not be parsed.
    #[error("Invalid query option {name}: {message}")]
    InvalidOption {
        /// Option name as given.
        name: String,
        /// Reason.
        message: String,
    },
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        QueryError::Storage(e.to_string())
    }
}

/// Options for [`ScoreQuery::fetch_validators`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Only validators with this payout type.
    pub payout_type: Option<PayoutType>,
    /// Only validators with one of these addresses; empty means all.
    pub addresses: Vec<String>,
    /// Reserved for callers that filter on activity themselves.
    pub only_active: bool,
    /// Drop validators whose name contains the unknown-validator marker.
    pub only_known: bool,
    /// Keep generated icons in the result.
    pub with_identicons: bool,
    /// Include score components and size ratio.
    pub with_scores: bool,
    /// Attach the activity row of this epoch.
    pub epoch_number: Option<i64>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            payout_type: None,
            addresses: Vec::new(),
            only_active: false,
            only_known: true,
            with_identicons: false,
            with_scores: false,
            epoch_number: None,
        }
    }
}

impl FetchOptions {
    /// Parse the string query parameters of the listing endpoint.
    ///
    /// Booleans accept exactly `"true"` or `"false"`; unrecognised keys are ignored.
    pub fn from_query_params(params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let defaults = Self::default();

        let payout_type = params
            .get("payout-type")
            .map(|v| {
                v.parse::<PayoutType>().map_err(|e| QueryError::InvalidOption {
                    name: "payout-type".to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            payout_type,
            only_active: parse_flag(params, "only-active", defaults.only_active)?,
            only_known: parse_flag(params, "only-known", defaults.only_known)?,
            with_identicons: parse_flag(params, "with-identicons", defaults.with_identicons)?,
            with_scores: parse_flag(params, "with-scores", defaults.with_scores)?,
            ..defaults
        })
    }

    /// Filters implied by these options; the score filter is always present.
    pub fn filters(&self) -> Vec<Filter> {
        let mut filters = vec![Filter::HasScore];
        if let Some(payout_type) = self.payout_type {
            filters.push(Filter::PayoutType(payout_type));
        }
        if !self.addresses.is_empty() {
            filters.push(Filter::Addresses(self.addresses.clone()));
        }
        if self.only_known {
            filters.push(Filter::OnlyKnown);
        }
        filters
    }

    /// Joins implied by these options.
    pub fn joins(&self) -> Vec<Join> {
        let mut joins = vec![Join::LatestScore];
        if let Some(epoch) = self.epoch_number {
            joins.push(Join::Activity(epoch));
        }
        joins
    }

    /// Optional projected columns implied by these options.
    pub fn projections(&self) -> Vec<Projection> {
        let activity = self.epoch_number.is_some();
        let mut projections = vec![Projection::Balance { activity }];
        if self.with_scores {
            projections.push(Projection::SizeRatio { activity });
            projections.push(Projection::Score);
        }
        projections
    }
}

fn parse_flag(
    params: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, QueryError> {
    match params.get(name).map(String::as_str) {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(QueryError::InvalidOption {
            name: name.to_string(),
            message: format!("expected 'true' or 'false', got {:?}", other),
        }),
    }
}

/// A `WHERE` predicate of the listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Validator has at least one score row.
    HasScore,
    /// Exact payout type.
    PayoutType(PayoutType),
    /// Address in the given set.
    Addresses(Vec<String>),
    /// Name does not contain the unknown-validator marker, ignoring case.
    OnlyKnown,
}

impl Filter {
    fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Filter::HasScore => {
                qb.push("s.validator_id IS NOT NULL");
            }
            Filter::PayoutType(payout_type) => {
                qb.push("v.payout_type = ").push_bind(payout_type.as_str());
            }
            Filter::Addresses(addresses) => {
                qb.push("v.address IN (");
                let mut list = qb.separated(", ");
                for address in addresses {
                    list.push_bind(address.clone());
                }
                list.push_unseparated(")");
            }
            Filter::OnlyKnown => {
                qb.push("lower(v.name) NOT LIKE lower(")
                    .push_bind(format!("%{}%", UNKNOWN_VALIDATOR_NAME))
                    .push(")");
            }
        }
    }
}

/// A `LEFT JOIN` of the listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// The latest score window of each validator, aliased `s`.
    LatestScore,
    /// The activity row of one epoch, aliased `a`.
    Activity(i64),
}

impl Join {
    fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Join::LatestScore => {
                qb.push(" LEFT JOIN latest_scores s ON s.validator_id = v.id AND s.rn = 1");
            }
            Join::Activity(epoch) => {
                qb.push(" LEFT JOIN activity a ON a.validator_id = v.id AND a.epoch_number = ")
                    .push_bind(*epoch);
            }
        }
    }
}

/// An optional group of projected columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// `balance`, from the activity join when present.
    Balance {
        /// Whether the activity join exists.
        activity: bool,
    },
    /// `size_ratio`, from the activity join when present.
    SizeRatio {
        /// Whether the activity join exists.
        activity: bool,
    },
    /// Latest score components.
    Score,
}

impl Projection {
    fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Projection::Balance { activity: true } => qb.push(", a.balance AS balance"),
            Projection::Balance { activity: false } => qb.push(", NULL AS balance"),
            Projection::SizeRatio { activity: true } => qb.push(", a.size_ratio AS size_ratio"),
            Projection::SizeRatio { activity: false } => qb.push(", NULL AS size_ratio"),
            Projection::Score => qb.push(
                ", s.total AS score_total, s.liveness AS score_liveness, \
                 s.size AS score_size, s.reliability AS score_reliability",
            ),
        };
    }
}

/// Validator with its latest score, as returned by
/// [`ScoreQuery::fetch_validators_score_by_ids`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorScore {
    /// Validator id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Address.
    pub address: String,
    /// Commission.
    pub fee: Fee,
    /// Payout policy.
    pub payout_type: PayoutType,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Icon data URI.
    pub icon: String,
    /// Operated by the Nimiq team.
    pub is_maintained_by_nimiq: bool,
    /// Website.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Liveness of the latest window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<f64>,
    /// Total of the latest window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Size of the latest window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Reliability of the latest window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,
}

/// Validator listing entry returned by [`ScoreQuery::fetch_validators`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedValidator {
    /// Validator id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Address.
    pub address: String,
    /// Commission.
    pub fee: Fee,
    /// Payout policy.
    pub payout_type: PayoutType,
    /// Payout schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_schedule: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Icon data URI; absent for generated icons unless requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Accent colour.
    pub accent_color: String,
    /// Operated by the Nimiq team.
    pub is_maintained_by_nimiq: bool,
    /// True when the stored icon was generated.
    pub has_default_icon: bool,
    /// Website.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Balance in the requested epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,
    /// Size ratio in the requested epoch; only with scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_ratio: Option<i64>,
    /// Latest score; only with scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreValues>,
}

/// Read-only queries over validators, scores and activity.
#[derive(Debug, Clone)]
pub struct ScoreQuery {
    storage: Storage,
}

impl ScoreQuery {
    /// Create a query handle over `storage`.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Validators with the given ids joined with their latest score window.
    ///
    /// One entry per validator, sorted by `total` descending; validators
    /// without any score come last and ties are broken by ascending id.
    pub async fn fetch_validators_score_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<ValidatorScore>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(LATEST_SCORES_CTE);
        qb.push(
            "SELECT v.id, v.name, v.address, v.fee, v.payout_type, v.description, v.icon, \
             v.is_maintained_by_nimiq, v.website, \
             s.liveness, s.total, s.size, s.reliability \
             FROM validators v",
        );
        Join::LatestScore.push(&mut qb);
        qb.push(" WHERE v.id IN (");
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(")");
        qb.push(SCORE_ORDER);

        let rows = qb
            .build()
            .fetch_all(self.storage.pool())
            .await
            .map_err(log_query_error)?;

        rows.iter()
            .map(row_to_validator_score)
            .collect::<Result<_, _>>()
            .map_err(log_query_error)
    }

    /// List validators that have at least one score, shaped by `options`.
    pub async fn fetch_validators(
        &self,
        options: &FetchOptions,
    ) -> Result<Vec<FetchedValidator>, QueryError> {
        if options.only_active {
            debug!("only-active is applied by the caller, not by the listing query");
        }

        let mut qb = QueryBuilder::<Sqlite>::new(LATEST_SCORES_CTE);
        qb.push(
            "SELECT v.id, v.name, v.address, v.fee, v.payout_type, v.payout_schedule, \
             v.description, v.icon, v.accent_color, v.is_maintained_by_nimiq, \
             v.has_default_icon, v.website",
        );
        for projection in options.projections() {
            projection.push(&mut qb);
        }
        qb.push(" FROM validators v");
        for join in options.joins() {
            join.push(&mut qb);
        }
        for (i, filter) in options.filters().iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            filter.push(&mut qb);
        }
        qb.push(SCORE_ORDER);

        let rows = qb
            .build()
            .fetch_all(self.storage.pool())
            .await
            .map_err(log_query_error)?;

        rows.iter()
            .map(|row| row_to_fetched_validator(row, options))
            .collect::<Result<_, _>>()
            .map_err(log_query_error)
    }
}

fn log_query_error(e: sqlx::Error) -> QueryError {
    error!("Error fetching validators: {}", e);
    QueryError::from(e)
}

fn decode_payout_type(row: &SqliteRow) -> Result<PayoutType, sqlx::Error> {
    row.try_get::<Option<String>, _>("payout_type")?
        .map(|p| p.parse::<PayoutType>())
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "payout_type".to_string(),
            source: Box::new(e),
        })
}

fn decode_fee(row: &SqliteRow) -> Result<Fee, sqlx::Error> {
    Ok(row
        .try_get::<Option<f64>, _>("fee")?
        .map(Fee::from)
        .unwrap_or_default())
}

fn row_to_validator_score(row: &SqliteRow) -> Result<ValidatorScore, sqlx::Error> {
    Ok(ValidatorScore {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        fee: decode_fee(row)?,
        payout_type: decode_payout_type(row)?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        is_maintained_by_nimiq: row
            .try_get::<Option<bool>, _>("is_maintained_by_nimiq")?
            .unwrap_or(false),
        website: row.try_get("website")?,
        liveness: row.try_get("liveness")?,
        total: row.try_get("total")?,
        size: row.try_get("size")?,
        reliability: row.try_get("reliability")?,
    })
}

fn row_to_fetched_validator(
    row: &SqliteRow,
    options: &FetchOptions,
) -> Result<FetchedValidator, sqlx::Error> {
    let has_default_icon: bool = row.try_get("has_default_icon")?;
    let icon: String = row.try_get("icon")?;

    let (size_ratio, score) = if options.with_scores {
        let total: Option<f64> = row.try_get("score_total")?;
        let score = match total {
            Some(total) => Some(ScoreValues {
                total,
                liveness: row.try_get("score_liveness")?,
                size: row.try_get("score_size")?,
                reliability: row.try_get("score_reliability")?,
            }),
            None => None,
        };
        (row.try_get::<Option<i64>, _>("size_ratio")?, score)
    } else {
        (None, None)
    };

    Ok(FetchedValidator {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        fee: decode_fee(row)?,
        payout_type: decode_payout_type(row)?,
        payout_schedule: row.try_get("payout_schedule")?,
        description: row.try_get("description")?,
        icon: if has_default_icon && !options.with_identicons {
            None
        } else {
            Some(icon)
        },
        accent_color: row.try_get("accent_color")?,
        is_maintained_by_nimiq: row
            .try_get::<Option<bool>, _>("is_maintained_by_nimiq")?
            .unwrap_or(false),
        has_default_icon,
        website: row.try_get("website")?,
        balance: row.try_get::<Option<f64>, _>("balance")?.map(Balance::from),
        size_ratio,
        score,
    })
}

/// Drop every `null` object member, recursing through objects and arrays.
///
/// Array elements keep their positions; a `null` element stays `null`
/// because arrays have no absent slot.
pub fn normalize_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, normalize_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_nulls).collect()),
        other => other,
    }
}

/// Serialize `value` and normalize nulls away.
pub fn to_normalized_json<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    serde_json::to_value(value).map(normalize_nulls)
}
