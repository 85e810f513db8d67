//! In-memory catalog repository.
//!
//! Mirrors the relational adapter's semantics: unique inventory codes,
//! version-guarded changesets applied all-or-nothing, cascading deletes.
//! Tests can queue interleaved writes that run just before the next
//! mutation, reproducing the race windows between a service's checks and
//! its write.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{
    CatalogRepository, CatalogRepositoryError, ChangesetResult, NewCatalogRecord, RecordChangeset,
};
use crate::domain::{
    AdditionalAsset, AssetPath, AssetReference, AssetSlot, CatalogRecord, InventoryCode, RecordId,
    RecordVersion,
};

/// A concurrent write injected ahead of the next mutation.
#[derive(Debug, Clone)]
enum Interleaving {
    Insert(Box<NewCatalogRecord>),
    BumpVersion(RecordId),
}

#[derive(Default)]
struct CatalogState {
    next_record_id: i64,
    next_asset_id: i64,
    records: BTreeMap<RecordId, CatalogRecord>,
    interleavings: VecDeque<Interleaving>,
}

impl CatalogState {
    fn code_taken(&self, code: &InventoryCode, exclude: Option<RecordId>) -> bool {
        self.records.values().any(|record| {
            Some(record.id) != exclude && record.fields.inventory_code.as_ref() == Some(code)
        })
    }

    fn insert(&mut self, new: &NewCatalogRecord) -> Result<RecordId, CatalogRepositoryError> {
        if let Some(code) = &new.fields.inventory_code {
            if self.code_taken(code, None) {
                return Err(CatalogRepositoryError::duplicate_code(code.as_str()));
            }
        }
        self.next_record_id += 1;
        let id = RecordId::new(self.next_record_id);
        let additional_assets = new
            .additional_assets
            .iter()
            .zip(0_u32..)
            .map(|(asset, position)| {
                self.next_asset_id += 1;
                AdditionalAsset {
                    id: self.next_asset_id,
                    path: asset.path.clone(),
                    caption: asset.caption.clone(),
                    position,
                }
            })
            .collect();
        self.records.insert(
            id,
            CatalogRecord {
                id,
                fields: new.fields.clone(),
                version: RecordVersion::INITIAL,
                primary_asset: new.primary_asset.clone(),
                additional_assets,
                created_at: new.created_at,
                updated_at: None,
            },
        );
        Ok(id)
    }

    fn run_interleavings(&mut self) {
        while let Some(step) = self.interleavings.pop_front() {
            match step {
                Interleaving::Insert(record) => {
                    // A rejected concurrent insert simply never happened.
                    let _ = self.insert(&record);
                }
                Interleaving::BumpVersion(id) => {
                    if let Some(record) = self.records.get_mut(&id) {
                        record.version = record.version.next();
                    }
                }
            }
        }
    }
}

/// Map-backed [`CatalogRepository`].
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing the service.
    pub fn seed(&self, record: NewCatalogRecord) -> Result<RecordId, CatalogRepositoryError> {
        self.state().insert(&record)
    }

    pub fn record(&self, id: RecordId) -> Option<CatalogRecord> {
        self.state().records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    /// Have another writer insert `record` just before the next mutation.
    pub fn interleave_insert(&self, record: NewCatalogRecord) {
        self.state()
            .interleavings
            .push_back(Interleaving::Insert(Box::new(record)));
    }

    /// Have another writer commit an edit to `id` just before the next
    /// mutation.
    pub fn interleave_edit(&self, id: RecordId) {
        self.state()
            .interleavings
            .push_back(Interleaving::BumpVersion(id));
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_inventory_codes(&self) -> Result<Vec<String>, CatalogRepositoryError> {
        Ok(self
            .state()
            .records
            .values()
            .filter_map(|record| record.fields.inventory_code.as_ref())
            .map(|code| code.as_str().to_owned())
            .collect())
    }

    async fn code_exists(
        &self,
        code: &InventoryCode,
        exclude: Option<RecordId>,
    ) -> Result<bool, CatalogRepositoryError> {
        Ok(self.state().code_taken(code, exclude))
    }

    async fn find_by_id(
        &self,
        id: RecordId,
    ) -> Result<Option<CatalogRecord>, CatalogRepositoryError> {
        Ok(self.record(id))
    }

    async fn insert(&self, record: &NewCatalogRecord) -> Result<RecordId, CatalogRepositoryError> {
        let mut state = self.state();
        state.run_interleavings();
        state.insert(record)
    }

    async fn apply_update(
        &self,
        changeset: &RecordChangeset,
    ) -> Result<ChangesetResult, CatalogRepositoryError> {
        let mut state = self.state();
        state.run_interleavings();

        let current = state.records.get(&changeset.id).map(|record| record.version);
        if current != Some(changeset.expected_version) {
            return Ok(ChangesetResult::VersionMismatch { current });
        }
        if let Some(code) = &changeset.fields.inventory_code {
            if state.code_taken(code, Some(changeset.id)) {
                return Err(CatalogRepositoryError::duplicate_code(code.as_str()));
            }
        }

        let mut next_asset_id = state.next_asset_id;
        let Some(record) = state.records.get_mut(&changeset.id) else {
            return Ok(ChangesetResult::VersionMismatch { current: None });
        };

        let mut released: Vec<AssetPath> = Vec::new();
        if let Some(previous) = &record.primary_asset {
            if changeset.primary_asset.as_ref() != Some(previous) {
                released.push(previous.clone());
            }
        }

        let mut kept = Vec::new();
        for retained in &changeset.retained_assets {
            if let Some(asset) = record
                .additional_assets
                .iter()
                .find(|asset| asset.id == retained.asset_id)
            {
                kept.push(AdditionalAsset {
                    caption: retained.caption.clone(),
                    ..asset.clone()
                });
            }
        }
        released.extend(
            record
                .additional_assets
                .iter()
                .filter(|asset| !kept.iter().any(|k| k.id == asset.id))
                .map(|asset| asset.path.clone()),
        );
        for asset in &changeset.new_assets {
            next_asset_id += 1;
            kept.push(AdditionalAsset {
                id: next_asset_id,
                path: asset.path.clone(),
                caption: asset.caption.clone(),
                position: 0,
            });
        }
        for (asset, position) in kept.iter_mut().zip(0_u32..) {
            asset.position = position;
        }

        record.fields = changeset.fields.clone();
        record.primary_asset = changeset.primary_asset.clone();
        record.additional_assets = kept;
        record.version = record.version.next();
        record.updated_at = Some(changeset.updated_at);
        let version = record.version;
        state.next_asset_id = next_asset_id;

        Ok(ChangesetResult::Applied { version, released })
    }

    async fn delete(&self, id: RecordId) -> Result<Option<Vec<AssetPath>>, CatalogRepositoryError> {
        Ok(self
            .state()
            .records
            .remove(&id)
            .map(|record| record.owned_assets()))
    }

    async fn list_asset_references(&self) -> Result<Vec<AssetReference>, CatalogRepositoryError> {
        let state = self.state();
        let mut references = Vec::new();
        for record in state.records.values() {
            if let Some(path) = &record.primary_asset {
                references.push(AssetReference {
                    record_id: record.id,
                    path: path.clone(),
                    slot: AssetSlot::Primary,
                    position: 0,
                });
            }
            references.extend(record.additional_assets.iter().map(|asset| AssetReference {
                record_id: record.id,
                path: asset.path.clone(),
                slot: AssetSlot::Additional,
                position: asset.position,
            }));
        }
        Ok(references)
    }

    async fn is_asset_referenced(&self, file_name: &str) -> Result<bool, CatalogRepositoryError> {
        Ok(self.state().records.values().any(|record| {
            record
                .owned_assets()
                .iter()
                .any(|path| path.file_name() == file_name)
        }))
    }
}
