//! Validator write path.
//!
//! [`ValidatorStore`] validates the address, consults the [`AddressCache`],
//! resolves branding and then issues a single insert-or-get or upsert
//! statement. Storage failures never panic or propagate as `anyhow` errors;
//! they come back as [`StoreError`] values and also evict the cache entry.

use async_trait::async_trait;
use nimiq_validators_core::{ValidatorAddress, ValidatorJson};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::branding::{BrandingParameters, BrandingProvider};
use crate::cache::AddressCache;
use crate::storage::{NewValidator, Storage};

/// Storage primitives used by the write path.
#[async_trait]
pub trait ValidatorRepository: Send + Sync {
    /// Id of the validator with `address`, if stored.
    async fn find_validator_id(&self, address: &str) -> anyhow::Result<Option<i64>>;

    /// Insert unless present; return the id of the row holding `address`.
    async fn insert_validator_or_get(
        &self,
        address: &str,
        record: &NewValidator,
    ) -> anyhow::Result<i64>;

    /// Insert or overwrite the row holding `address`; return its id.
    async fn upsert_validator(&self, address: &str, record: &NewValidator) -> anyhow::Result<i64>;

    /// Delete the row with `id`, cascading to its scores and activity.
    async fn delete_validator(&self, id: i64) -> anyhow::Result<bool>;
}

#[async_trait]
impl ValidatorRepository for Storage {
    async fn find_validator_id(&self, address: &str) -> anyhow::Result<Option<i64>> {
        Storage::find_validator_id(self, address).await
    }

    async fn insert_validator_or_get(
        &self,
        address: &str,
        record: &NewValidator,
    ) -> anyhow::Result<i64> {
        Storage::insert_validator_or_get(self, address, record).await
    }

    async fn upsert_validator(&self, address: &str, record: &NewValidator) -> anyhow::Result<i64> {
        Storage::upsert_validator(self, address, record).await
    }

    async fn delete_validator(&self, id: i64) -> anyhow::Result<bool> {
        Storage::delete_validator(self, id).await
    }
}

/// Why a validator was not stored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Address does not follow the Nimiq layout; nothing was written.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Address is not on the configured allow-list; nothing was written.
    #[error("Address {0} is not on the write allow-list")]
    NotAllowed(String),

    /// Branding parameters could not be computed; nothing was written.
    #[error("Failed to compute branding for {address}: {message}")]
    Branding {
        /// Validator address.
        address: String,
        /// Underlying error.
        message: String,
    },

    /// The storage layer failed; the write may or may not have landed.
    #[error("Failed to write {address} into the database: {message}")]
    Storage {
        /// Validator address.
        address: String,
        /// Underlying error.
        message: String,
    },
}

/// Options for [`ValidatorStore::store_validator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Write the profile even if the validator already exists.
    pub upsert: bool,
}

impl StoreOptions {
    /// Options with `upsert` enabled.
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Write path for validators, owning its address cache.
#[derive(Clone)]
pub struct ValidatorStore {
    repository: Arc<dyn ValidatorRepository>,
    branding: Arc<dyn BrandingProvider>,
    cache: AddressCache,
    allowed_addresses: Option<Arc<HashSet<String>>>,
}

impl ValidatorStore {
    /// Create a store over `repository` using `branding` for display fields.
    pub fn new(repository: Arc<dyn ValidatorRepository>, branding: Arc<dyn BrandingProvider>) -> Self {
        Self {
            repository,
            branding,
            cache: AddressCache::new(),
            allowed_addresses: None,
        }
    }

    /// Restrict writes to `addresses`. An empty list allows every address.
    pub fn with_allowed_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = addresses.into_iter().map(Into::into).collect();
        self.allowed_addresses = if set.is_empty() { None } else { Some(Arc::new(set)) };
        self
    }

    /// The cache shared by clones of this store.
    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// Store a validator and return its id.
    ///
    /// Without `upsert`, a cached or already stored address returns the
    /// existing id and writes nothing. With `upsert`, the profile is written
    /// in a single insert-or-update statement keyed by the unique address.
    pub async fn store_validator(
        &self,
        address: &str,
        fields: &ValidatorJson,
        options: StoreOptions,
    ) -> Result<i64, StoreError> {
        let address = ValidatorAddress::new(address).map_err(|e| {
            error!("Invalid address: {}. Error: {}", address, e);
            StoreError::InvalidAddress(address.to_string())
        })?;

        if let Some(allowed) = &self.allowed_addresses {
            if !allowed.contains(address.as_str()) {
                warn!("Skipping {}: not on the write allow-list", address);
                return Err(StoreError::NotAllowed(address.into_inner()));
            }
        }

        if !options.upsert {
            if let Some(id) = self.cache.get(address.as_str()).await {
                debug!("Validator {} served from cache", address);
                return Ok(id);
            }

            match self.repository.find_validator_id(address.as_str()).await {
                Ok(Some(id)) => {
                    info!("Validator {} already exists in the database", address);
                    self.cache.set(address.as_str(), id).await;
                    return Ok(id);
                }
                Ok(None) => {}
                Err(e) => return Err(self.storage_failure(&address, e).await),
            }
        }

        info!(
            "{} validator {}",
            if options.upsert { "Updating" } else { "Storing" },
            address
        );

        let branding = self
            .branding
            .branding_parameters(&address, fields)
            .await
            .map_err(|e| {
                error!("Failed to compute branding for {}: {:#}", address, e);
                StoreError::Branding {
                    address: address.to_string(),
                    message: format!("{:#}", e),
                }
            })?;
        let record = new_validator_record(fields, branding);

        let written = if options.upsert {
            self.repository
                .upsert_validator(address.as_str(), &record)
                .await
        } else {
            self.repository
                .insert_validator_or_get(address.as_str(), &record)
                .await
        };

        match written {
            Ok(id) => {
                self.cache.set(address.as_str(), id).await;
                Ok(id)
            }
            Err(e) => Err(self.storage_failure(&address, e).await),
        }
    }

    /// Delete the validator with `address` and evict it from the cache.
    ///
    /// Returns `false` when no such validator is stored. Deletes must go
    /// through here rather than [`Storage::delete_validator`], otherwise a
    /// later plain store is served the stale id from the cache.
    pub async fn delete_validator(&self, address: &str) -> Result<bool, StoreError> {
        let address = ValidatorAddress::new(address)
            .map_err(|_| StoreError::InvalidAddress(address.to_string()))?;

        // Evict first so a failed delete never leaves a stale entry behind
        self.cache.invalidate(address.as_str()).await;

        let id = match self.repository.find_validator_id(address.as_str()).await {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(false),
            Err(e) => return Err(self.storage_failure(&address, e).await),
        };

        match self.repository.delete_validator(id).await {
            Ok(deleted) => {
                info!("Deleted validator {} (id {})", address, id);
                Ok(deleted)
            }
            Err(e) => Err(self.storage_failure(&address, e).await),
        }
    }

    async fn storage_failure(&self, address: &ValidatorAddress, err: anyhow::Error) -> StoreError {
        error!(
            "There was an error while writing {} into the database: {:#}",
            address, err
        );
        self.cache.invalidate(address.as_str()).await;
        StoreError::Storage {
            address: address.to_string(),
            message: format!("{:#}", err),
        }
    }
}

/// Combine a published profile with its resolved branding.
pub fn new_validator_record(fields: &ValidatorJson, branding: BrandingParameters) -> NewValidator {
    NewValidator {
        name: fields.name.clone(),
        description: fields.description.clone(),
        fee: fields.fee,
        payout_type: fields.payout_type,
        payout_schedule: Some(fields.payout_schedule.clone()).filter(|s| !s.is_empty()),
        is_maintained_by_nimiq: fields.is_maintained_by_nimiq.unwrap_or(false),
        icon: branding.icon,
        has_default_icon: branding.has_default_icon,
        accent_color: branding.accent_color,
        website: fields.website.clone(),
        contact: fields.contact.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branding::IdenticonBranding;
    use crate::storage::test_utils::setup_storage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ADDRESS: &str = "NQ37 6EL5 BP9K XL1A 3ED0 L3EC NPR5 C9D3 BRKG";
    const OTHER: &str = "NQ12 3ABC DEFG HJKL MNPQ RSTU VXY0 1234 5678";

    /// Counts every call that reaches storage.
    struct CountingRepository {
        inner: Storage,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl CountingRepository {
        fn new(inner: Storage) -> Self {
            Self {
                inner,
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ValidatorRepository for CountingRepository {
        async fn find_validator_id(&self, address: &str) -> anyhow::Result<Option<i64>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_validator_id(address).await
        }

        async fn insert_validator_or_get(
            &self,
            address: &str,
            record: &NewValidator,
        ) -> anyhow::Result<i64> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.insert_validator_or_get(address, record).await
        }

        async fn upsert_validator(&self, address: &str, record: &NewValidator) -> anyhow::Result<i64> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.upsert_validator(address, record).await
        }

        async fn delete_validator(&self, id: i64) -> anyhow::Result<bool> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_validator(id).await
        }
    }

    /// Fails every write until `healed` is set.
    struct FlakyRepository {
        inner: Storage,
        healed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ValidatorRepository for FlakyRepository {
        async fn find_validator_id(&self, address: &str) -> anyhow::Result<Option<i64>> {
            self.inner.find_validator_id(address).await
        }

        async fn insert_validator_or_get(
            &self,
            address: &str,
            record: &NewValidator,
        ) -> anyhow::Result<i64> {
            if !self.healed.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.insert_validator_or_get(address, record).await
        }

        async fn upsert_validator(&self, address: &str, record: &NewValidator) -> anyhow::Result<i64> {
            if !self.healed.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.upsert_validator(address, record).await
        }

        async fn delete_validator(&self, id: i64) -> anyhow::Result<bool> {
            if !self.healed.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.delete_validator(id).await
        }
    }

    fn store_over(repository: Arc<dyn ValidatorRepository>) -> ValidatorStore {
        ValidatorStore::new(repository, Arc::new(IdenticonBranding))
    }

    fn profile(name: &str) -> ValidatorJson {
        let mut json = ValidatorJson::with_address(ADDRESS);
        json.name = Some(name.to_string());
        json
    }

    #[tokio::test]
    async fn test_invalid_address_writes_nothing() {
        let (storage, _temp_db) = setup_storage().await;
        let repo = Arc::new(CountingRepository::new(storage.clone()));
        let store = store_over(repo.clone());

        let err = store
            .store_validator("NQ00 NOPE", &profile("Alice"), StoreOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::InvalidAddress("NQ00 NOPE".to_string()));
        assert_eq!(repo.reads() + repo.writes(), 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_second_plain_store_is_served_from_cache() {
        let (storage, _temp_db) = setup_storage().await;
        let repo = Arc::new(CountingRepository::new(storage.clone()));
        let store = store_over(repo.clone());

        let first = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!((repo.reads(), repo.writes()), (1, 1));

        let second = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        // No storage traffic at all on the cached call
        assert_eq!((repo.reads(), repo.writes()), (1, 1));
        assert_eq!(storage.count_validators().await.unwrap(), 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_existing_row_populates_cache_without_write() {
        let (storage, _temp_db) = setup_storage().await;

        // Written by another process
        let existing = store_over(Arc::new(storage.clone()))
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();

        let repo = Arc::new(CountingRepository::new(storage.clone()));
        let store = store_over(repo.clone());
        let id = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();

        assert_eq!(id, existing);
        assert_eq!((repo.reads(), repo.writes()), (1, 0));
        assert_eq!(store.cache().get(ADDRESS).await, Some(existing));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_keeps_id() {
        let (storage, _temp_db) = setup_storage().await;
        let repo = Arc::new(CountingRepository::new(storage.clone()));
        let store = store_over(repo.clone());

        let id = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();
        let updated = store
            .store_validator(ADDRESS, &profile("Alice Staking"), StoreOptions::upsert())
            .await
            .unwrap();

        assert_eq!(id, updated);
        assert_eq!(repo.writes(), 2);
        let stored = storage.get_validator(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Alice Staking");
        assert!(stored.has_default_icon);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_stores_for_new_address_share_one_row() {
        let (storage, _temp_db) = setup_storage().await;
        let store = store_over(Arc::new(storage.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let options = StoreOptions { upsert: i % 2 == 0 };
                store
                    .store_validator(ADDRESS, &profile("Alice"), options)
                    .await
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap());
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(storage.count_validators().await.unwrap(), 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_and_recovers() {
        let (storage, _temp_db) = setup_storage().await;
        let repo = Arc::new(FlakyRepository {
            inner: storage.clone(),
            healed: std::sync::atomic::AtomicBool::new(false),
        });
        let store = store_over(repo.clone());

        let err = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage { ref message, .. } if message.contains("disk full")));
        assert_eq!(store.cache().get(ADDRESS).await, None);

        repo.healed.store(true, Ordering::SeqCst);
        let id = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(storage.find_validator_id(ADDRESS).await.unwrap(), Some(id));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_allow_list() {
        let (storage, _temp_db) = setup_storage().await;
        let store = store_over(Arc::new(storage.clone())).with_allowed_addresses([ADDRESS]);

        assert!(store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .is_ok());
        let err = store
            .store_validator(OTHER, &profile("Bob"), StoreOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotAllowed(OTHER.to_string()));

        // An empty list means no restriction
        let open = store_over(Arc::new(storage.clone())).with_allowed_addresses(Vec::<String>::new());
        assert!(open
            .store_validator(OTHER, &profile("Bob"), StoreOptions::default())
            .await
            .is_ok());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_delete_evicts_cached_id() {
        let (storage, _temp_db) = setup_storage().await;
        let repo = Arc::new(CountingRepository::new(storage.clone()));
        let store = store_over(repo.clone());

        let id = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(store.cache().get(ADDRESS).await, Some(id));

        assert!(store.delete_validator(ADDRESS).await.unwrap());
        assert_eq!(store.cache().get(ADDRESS).await, None);
        assert_eq!(storage.find_validator_id(ADDRESS).await.unwrap(), None);

        // The next plain store writes a fresh row instead of reusing the stale id
        let recreated = store
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(
            storage.find_validator_id(ADDRESS).await.unwrap(),
            Some(recreated)
        );

        assert!(!store.delete_validator(OTHER).await.unwrap());
        assert!(matches!(
            store.delete_validator("NQ00 NOPE").await,
            Err(StoreError::InvalidAddress(_))
        ));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_failed_delete_still_evicts_cache() {
        let (storage, _temp_db) = setup_storage().await;
        let id = store_over(Arc::new(storage.clone()))
            .store_validator(ADDRESS, &profile("Alice"), StoreOptions::default())
            .await
            .unwrap();

        let repo = Arc::new(FlakyRepository {
            inner: storage.clone(),
            healed: std::sync::atomic::AtomicBool::new(false),
        });
        let store = store_over(repo.clone());
        store.cache().set(ADDRESS, id).await;

        let err = store.delete_validator(ADDRESS).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage { .. }));
        assert_eq!(store.cache().get(ADDRESS).await, None);
        assert_eq!(storage.find_validator_id(ADDRESS).await.unwrap(), Some(id));

        storage.close().await;
    }
}
