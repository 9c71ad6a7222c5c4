//! Address to id cache for the validator write path.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process map from validator address to storage id.
///
/// The cache only accelerates lookups: storage stays authoritative, and
/// entries are dropped whenever a write for the address fails so the next
/// call rereads the id.
#[derive(Debug, Clone, Default)]
pub struct AddressCache {
    ids: Arc<RwLock<HashMap<String, i64>>>,
}

impl AddressCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached id for `address`, if any.
    pub async fn get(&self, address: &str) -> Option<i64> {
        self.ids.read().await.get(address).copied()
    }

    /// Record `id` for `address`. Setting the same pair twice is a no-op.
    pub async fn set(&self, address: &str, id: i64) {
        self.ids.write().await.insert(address.to_string(), id);
    }

    /// Forget `address`.
    pub async fn invalidate(&self, address: &str) {
        self.ids.write().await.remove(address);
    }

    /// Number of cached addresses.
    pub async fn len(&self) -> usize {
        self.ids.read().await.len()
    }

    /// True when nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.ids.read().await.is_empty()
    }
}
