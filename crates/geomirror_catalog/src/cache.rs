//! Content cache abstraction and an in-memory implementation.

use crate::client::CatalogClient;
use crate::error::{CatalogError, CatalogResult};
use crate::types::{CacheEntry, CacheKey, ResourceKind};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// A store of previously fetched feature and coverage payloads.
///
/// Entries are keyed by [`CacheKey`]. The cache decides on its own whether
/// an entry is still fresh against the live source server.
pub trait ContentCache: Send + Sync {
    /// Looks up the entry for a resource.
    fn entry(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Returns true if the entry still matches the live source.
    fn is_valid(&self, source: &dyn CatalogClient, entry: &CacheEntry) -> bool;

    /// Fetches a feature type from the source and caches its payload.
    fn cache_feature_type(
        &self,
        source: &dyn CatalogClient,
        source_id: &str,
        workspace: &str,
        store: &str,
        name: &str,
    ) -> CatalogResult<CacheEntry>;

    /// Fetches a coverage from the source and caches its payload.
    fn cache_coverage(
        &self,
        source: &dyn CatalogClient,
        source_id: &str,
        workspace: &str,
        store: &str,
        name: &str,
    ) -> CatalogResult<CacheEntry>;

    /// Reads the payload an entry points at.
    fn read(&self, entry: &CacheEntry) -> CatalogResult<Vec<u8>>;
}

/// An in-memory content cache.
///
/// An entry is valid while it has not been invalidated and the source still
/// publishes the resource. Every trait call is recorded in a journal.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    stale: RwLock<HashSet<CacheKey>>,
    calls: Mutex<Vec<String>>,
    next_blob: AtomicU64,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a payload directly, replacing any previous entry.
    pub fn insert(&self, key: CacheKey, data: Vec<u8>) -> CacheEntry {
        let handle = self.store_blob(data);
        let entry = CacheEntry::new(key.clone(), handle);
        self.stale.write().remove(&key);
        self.replace_entry(entry.clone());
        entry
    }

    /// Marks an entry as stale so the next validation fails.
    pub fn invalidate(&self, key: &CacheKey) {
        self.stale.write().insert(key.clone());
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the recorded calls, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many recorded calls start with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn store_blob(&self, data: Vec<u8>) -> String {
        let id = self.next_blob.fetch_add(1, Ordering::SeqCst);
        let handle = format!("mem://blob/{id}");
        self.blobs.write().insert(handle.clone(), data);
        handle
    }

    /// Swaps in `entry` and drops the payload of the entry it replaces.
    fn replace_entry(&self, entry: CacheEntry) {
        let previous = self.entries.write().insert(entry.key.clone(), entry);
        if let Some(handle) = previous.and_then(|p| p.data_file) {
            self.blobs.write().remove(&handle);
        }
    }

    fn fetch_and_store(&self, key: CacheKey, download: CatalogResult<Vec<u8>>) -> CatalogResult<CacheEntry> {
        match download {
            Ok(data) => Ok(self.insert(key, data)),
            Err(e) => {
                // Keep the metadata so the next lookup sees an entry without data.
                self.replace_entry(CacheEntry::without_data(key));
                Err(e)
            }
        }
    }
}

impl ContentCache for MemoryCache {
    fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.record(format!("entry {key}"));
        self.entries.read().get(key).cloned()
    }

    fn is_valid(&self, source: &dyn CatalogClient, entry: &CacheEntry) -> bool {
        self.record(format!("is_valid {}", entry.key));
        if !entry.has_data() || self.stale.read().contains(&entry.key) {
            return false;
        }

        let key = &entry.key;
        let published = match key.kind {
            ResourceKind::FeatureType => source.feature_types(&key.workspace, &key.store),
            ResourceKind::Coverage => source.coverages(&key.workspace, &key.store),
        };
        published.is_ok_and(|names| names.iter().any(|n| n == &key.name))
    }

    fn cache_feature_type(
        &self,
        source: &dyn CatalogClient,
        source_id: &str,
        workspace: &str,
        store: &str,
        name: &str,
    ) -> CatalogResult<CacheEntry> {
        let key = CacheKey::new(source_id, workspace, ResourceKind::FeatureType, store, name);
        self.record(format!("cache_feature_type {key}"));
        self.fetch_and_store(key, source.download_layer_as_shapefile(workspace, name))
    }

    fn cache_coverage(
        &self,
        source: &dyn CatalogClient,
        source_id: &str,
        workspace: &str,
        store: &str,
        name: &str,
    ) -> CatalogResult<CacheEntry> {
        let key = CacheKey::new(source_id, workspace, ResourceKind::Coverage, store, name);
        self.record(format!("cache_coverage {key}"));
        self.fetch_and_store(key, source.download_coverage_as_geotiff(workspace, name))
    }

    fn read(&self, entry: &CacheEntry) -> CatalogResult<Vec<u8>> {
        self.record(format!("read {}", entry.key));
        let handle = entry
            .data_file
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CatalogError::Cache(format!("no cached data for {}", entry.key)))?;

        self.blobs
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| CatalogError::Cache(format!("missing blob {handle}")))
    }
}
