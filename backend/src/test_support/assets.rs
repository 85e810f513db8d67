//! In-memory asset store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{AssetStore, AssetStoreError, stored_asset_name};
use crate::domain::{AssetPath, StoredAsset};

/// Directory prefix recorded on paths handed out by the fake.
pub const FAKE_ASSET_DIR: &str = "database/uploads";

/// Map-backed [`AssetStore`] naming blobs exactly as the directory adapter
/// does.
#[derive(Default)]
pub struct InMemoryAssetStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_saves: AtomicBool,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a blob under an exact name, bypassing naming.
    pub fn insert(&self, name: &str, bytes: &[u8]) {
        self.blobs().insert(name.to_owned(), bytes.to_vec());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs().keys().cloned().collect()
    }

    /// Make every subsequent save fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn blobs(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetPath, AssetStoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AssetStoreError::io("disk full"));
        }
        let name = stored_asset_name(suggested_name)
            .ok_or_else(|| AssetStoreError::invalid_name(suggested_name))?;
        self.blobs().insert(name.clone(), bytes.to_vec());
        AssetPath::new(format!("{FAKE_ASSET_DIR}/{name}"))
            .map_err(|err| AssetStoreError::invalid_name(err.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<u64, AssetStoreError> {
        let bytes = self
            .blobs()
            .remove(name)
            .ok_or_else(|| AssetStoreError::not_found(name))?;
        Ok(u64::try_from(bytes.len()).unwrap_or(u64::MAX))
    }

    async fn list(&self) -> Result<Vec<StoredAsset>, AssetStoreError> {
        Ok(self
            .blobs()
            .iter()
            .map(|(name, bytes)| StoredAsset {
                name: name.clone(),
                size_bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            })
            .collect())
    }
}
