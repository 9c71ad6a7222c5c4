//! Batch import of validator files.

mod common;

use async_trait::async_trait;
use common::{address, setup_storage, CUSTOM_ICON};
use nimiq_validators_registry::storage::NewValidator;
use nimiq_validators_registry::{
    BatchImporter, IdenticonBranding, ImportError, Storage, StoreError, ValidatorRepository,
    ValidatorStore,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &serde_json::Value) {
    std::fs::write(dir.join(name), content.to_string()).unwrap();
}

fn write_validator(dir: &Path, n: u32, name: &str) {
    write_file(
        dir,
        &format!("{}.json", address(n)),
        &json!({
            "name": name,
            "address": address(n),
            "fee": 0.05,
            "payoutType": "restake",
            "website": "https://example.com",
        }),
    );
}

fn importer_over(storage: &Storage) -> BatchImporter {
    BatchImporter::new(ValidatorStore::new(
        Arc::new(storage.clone()),
        Arc::new(IdenticonBranding),
    ))
}

/// Fails every write for one address.
struct FailingRepository {
    inner: Storage,
    failing_address: String,
}

#[async_trait]
impl ValidatorRepository for FailingRepository {
    async fn find_validator_id(&self, address: &str) -> anyhow::Result<Option<i64>> {
        self.inner.find_validator_id(address).await
    }

    async fn insert_validator_or_get(
        &self,
        address: &str,
        record: &NewValidator,
    ) -> anyhow::Result<i64> {
        if address == self.failing_address {
            anyhow::bail!("constraint failed");
        }
        self.inner.insert_validator_or_get(address, record).await
    }

    async fn upsert_validator(&self, address: &str, record: &NewValidator) -> anyhow::Result<i64> {
        if address == self.failing_address {
            anyhow::bail!("constraint failed");
        }
        self.inner.upsert_validator(address, record).await
    }

    async fn delete_validator(&self, id: i64) -> anyhow::Result<bool> {
        self.inner.delete_validator(id).await
    }
}

#[tokio::test]
async fn test_import_valid_folder() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();

    write_validator(dir.path(), 1, "Alice");
    write_validator(dir.path(), 2, "Bob");
    write_file(
        dir.path(),
        &format!("{}.json", address(3)),
        &json!({ "address": address(3), "icon": CUSTOM_ICON, "accentColor": "#ff0000" }),
    );
    // Neither of these is a candidate
    write_file(
        dir.path(),
        "template.example.json",
        &json!({ "address": "not an address" }),
    );
    std::fs::write(dir.path().join("README.md"), "# validators").unwrap();

    let summary = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap();

    assert_eq!(summary.imported(), 3);
    assert_eq!(storage.count_validators().await.unwrap(), 3);

    let alice = storage
        .get_validator_by_address(&address(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.name, "Alice");
    assert_eq!(summary.ids[&address(1)], alice.id);
    assert!(alice.has_default_icon);

    let unnamed = storage
        .get_validator_by_address(&address(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unnamed.name, "Unknown validator");
    assert_eq!(unnamed.icon, CUSTOM_ICON);
    assert!(!unnamed.has_default_icon);
    assert_eq!(unnamed.accent_color, "#ff0000");

    storage.close().await;
}

#[tokio::test]
async fn test_reimport_updates_in_place() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();
    write_validator(dir.path(), 1, "Alice");

    let first = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap();

    write_validator(dir.path(), 1, "Alice Staking");
    let second = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap();

    assert_eq!(first.ids, second.ids);
    let stored = storage
        .get_validator_by_address(&address(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "Alice Staking");
    assert_eq!(storage.count_validators().await.unwrap(), 1);

    storage.close().await;
}

#[tokio::test]
async fn test_address_mismatch_aborts_before_any_write() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();

    write_validator(dir.path(), 1, "Alice");
    // File named after address 2 but describing address 3
    write_file(
        dir.path(),
        &format!("{}.json", address(2)),
        &json!({ "name": "Mallory", "address": address(3) }),
    );

    let err = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ImportError::AddressMismatch {
            file: format!("{}.json", address(2))
        }
    );
    assert_eq!(storage.count_validators().await.unwrap(), 0);

    storage.close().await;
}

#[tokio::test]
async fn test_invalid_json_names_the_file() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();

    write_validator(dir.path(), 1, "Alice");
    let broken = format!("{}.json", address(2));
    std::fs::write(dir.path().join(&broken), "{ \"name\": ").unwrap();

    let err = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::InvalidJson { ref file, .. } if *file == broken));
    assert!(err.to_string().starts_with("Invalid JSON in file:"));
    assert_eq!(storage.count_validators().await.unwrap(), 0);

    storage.close().await;
}

#[tokio::test]
async fn test_schema_failure_reports_every_field() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();

    write_file(
        dir.path(),
        &format!("{}.json", address(1)),
        &json!({
            "address": address(1),
            "fee": 2.5,
            "contact": { "twitter": "this handle is far too long" },
        }),
    );

    let err = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();

    match err {
        ImportError::InvalidFile { file, message } => {
            assert_eq!(file, format!("{}.json", address(1)));
            assert!(message.contains("fee"));
            assert!(message.contains("contact.twitter"));
        }
        other => panic!("expected InvalidFile, got {:?}", other),
    }

    storage.close().await;
}

#[tokio::test]
async fn test_unknown_payout_type_is_invalid_file() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();

    write_file(
        dir.path(),
        &format!("{}.json", address(1)),
        &json!({ "address": address(1), "payoutType": "weekly" }),
    );

    let err = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::InvalidFile { .. }));

    storage.close().await;
}

#[tokio::test]
async fn test_write_failures_are_aggregated() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();
    for (n, name) in [(1, "Alice"), (2, "Bob"), (3, "Carol")] {
        write_validator(dir.path(), n, name);
    }

    let repository = Arc::new(FailingRepository {
        inner: storage.clone(),
        failing_address: address(2),
    });
    let importer = BatchImporter::new(ValidatorStore::new(repository, Arc::new(IdenticonBranding)))
        .with_max_in_flight(2);

    let err = importer
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();

    match &err {
        ImportError::AggregateWrite { failures, stored } => {
            assert_eq!(*stored, 2);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].file, format!("{}.json", address(2)));
            assert!(matches!(failures[0].error, StoreError::Storage { .. }));
        }
        other => panic!("expected AggregateWrite, got {:?}", other),
    }
    assert!(err
        .to_string()
        .starts_with("There were errors while importing the validators:"));

    // The other records are persisted
    assert_eq!(storage.count_validators().await.unwrap(), 2);
    assert!(storage.find_validator_id(&address(1)).await.unwrap().is_some());
    assert!(storage.find_validator_id(&address(2)).await.unwrap().is_none());
    assert!(storage.find_validator_id(&address(3)).await.unwrap().is_some());

    storage.close().await;
}

#[tokio::test]
async fn test_allow_list_rejections_are_aggregated() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();
    write_validator(dir.path(), 1, "Alice");
    write_validator(dir.path(), 2, "Bob");

    let store = ValidatorStore::new(Arc::new(storage.clone()), Arc::new(IdenticonBranding))
        .with_allowed_addresses([address(1)]);
    let err = BatchImporter::new(store)
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();

    match err {
        ImportError::AggregateWrite { failures, stored } => {
            assert_eq!(stored, 1);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].error, StoreError::NotAllowed(address(2)));
        }
        other => panic!("expected AggregateWrite, got {:?}", other),
    }

    storage.close().await;
}

#[tokio::test]
async fn test_empty_folder_imports_nothing() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();

    let summary = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap();

    assert_eq!(summary.imported(), 0);

    storage.close().await;
}

#[tokio::test]
async fn test_has_default_icon_flag_is_stored() {
    let (storage, _temp_db) = setup_storage().await;
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        &format!("{}.json", address(1)),
        &json!({ "address": address(1), "icon": CUSTOM_ICON, "hasDefaultIcon": true }),
    );

    importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap();

    let stored = storage
        .get_validator_by_address(&address(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.icon, CUSTOM_ICON);
    assert!(stored.has_default_icon);

    // A custom-icon claim without an icon is rejected before any write
    write_file(
        dir.path(),
        &format!("{}.json", address(2)),
        &json!({ "address": address(2), "hasDefaultIcon": false }),
    );
    let err = importer_over(&storage)
        .import_validators_from_files(dir.path())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ImportError::InvalidFile { ref message, .. } if message.contains("hasDefaultIcon"))
    );

    storage.close().await;
}
