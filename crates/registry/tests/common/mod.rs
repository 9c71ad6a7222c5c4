//! Shared fixtures for integration tests.

#![allow(dead_code)]

use nimiq_validators_registry::storage::ScoreRecord;
use nimiq_validators_registry::{
    IdenticonBranding, ScoreValues, Storage, StoreOptions, ValidatorJson, ValidatorStore,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A valid, distinct address per `n`.
pub fn address(n: u32) -> String {
    format!("NQ{:02} 0000 0000 0000 0000 0000 0000 0000 {:04}", n % 100, n)
}

/// A minimal but fully valid PNG data URI.
pub const CUSTOM_ICON: &str = "data:image/png;base64,iVBORw0KGgo=";

pub async fn setup_storage() -> (Storage, NamedTempFile) {
    let temp_db = NamedTempFile::new().unwrap();
    let storage = Storage::new_with_path(temp_db.path(), None, None)
        .await
        .unwrap();
    storage.run_migrations().await.unwrap();
    (storage, temp_db)
}

pub fn store_over(storage: &Storage) -> ValidatorStore {
    ValidatorStore::new(Arc::new(storage.clone()), Arc::new(IdenticonBranding))
}

pub fn profile(address: &str, name: &str) -> ValidatorJson {
    let mut json = ValidatorJson::with_address(address);
    json.name = Some(name.to_string());
    json
}

/// Store `profile` and return the new id.
pub async fn insert(storage: &Storage, profile: &ValidatorJson) -> i64 {
    store_over(storage)
        .store_validator(&profile.address, profile, StoreOptions::upsert())
        .await
        .unwrap()
}

pub async fn insert_score(storage: &Storage, validator_id: i64, window: (i64, i64), total: f64) {
    storage
        .upsert_score(&ScoreRecord {
            validator_id,
            from_epoch: window.0,
            to_epoch: window.1,
            values: ScoreValues {
                total,
                liveness: 1.0,
                size: 0.5,
                reliability: 0.75,
            },
            reason: serde_json::json!({ "source": "test" }),
        })
        .await
        .unwrap();
}

/// True if any object member anywhere in `value` is `null`.
pub fn has_null_member(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| v.is_null() || has_null_member(v)),
        Value::Array(items) => items.iter().any(has_null_member),
        _ => false,
    }
}
