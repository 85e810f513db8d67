//! Port for catalog record persistence.
//!
//! The [`CatalogRepository`] trait is the only access path the catalog
//! services have to the relational store. Multi-statement writes are exposed
//! as single atomic operations ([`CatalogRepository::insert`],
//! [`CatalogRepository::apply_update`], [`CatalogRepository::delete`]) so an
//! adapter can run each inside one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AssetPath, AssetReference, CatalogRecord, InventoryCode, RecordFields, RecordId,
    RecordVersion,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by catalog repository adapters.
    pub enum CatalogRepositoryError {
        /// Repository connection could not be established or timed out.
        Connection { message: String } =>
            "catalog repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "catalog repository query failed: {message}",
        /// The store's uniqueness constraint rejected an inventory code.
        DuplicateCode { code: String } =>
            "inventory code {code} is already in use",
    }
}

/// An additional asset to attach to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssetReference {
    pub path: AssetPath,
    pub caption: String,
}

/// A record ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalogRecord {
    pub fields: RecordFields,
    pub primary_asset: Option<AssetPath>,
    pub additional_assets: Vec<NewAssetReference>,
    pub created_at: DateTime<Utc>,
}

/// An existing additional asset the editor chose to keep.
///
/// Retained assets are re-numbered in list order; any additional asset of the
/// record missing from the list is dropped by the changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedAsset {
    pub asset_id: i64,
    pub caption: String,
}

/// Everything one edit changes, applied atomically and only if the stored
/// version still equals `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChangeset {
    pub id: RecordId,
    pub expected_version: RecordVersion,
    pub fields: RecordFields,
    /// Primary asset after the edit; `None` clears it.
    pub primary_asset: Option<AssetPath>,
    pub retained_assets: Vec<RetainedAsset>,
    pub new_assets: Vec<NewAssetReference>,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`CatalogRepository::apply_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangesetResult {
    /// The conditional write matched; the record now carries `version`.
    Applied {
        version: RecordVersion,
        /// Paths no longer referenced by the record: dropped additional assets
        /// and a replaced primary asset.
        released: Vec<AssetPath>,
    },
    /// Zero rows matched: either the version moved on or the record is gone.
    /// Nothing was written.
    VersionMismatch { current: Option<RecordVersion> },
}

/// Port for catalog record storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Every non-empty inventory code currently stored.
    async fn list_inventory_codes(&self) -> Result<Vec<String>, CatalogRepositoryError>;

    /// Whether a record other than `exclude` holds `code`.
    async fn code_exists(
        &self,
        code: &InventoryCode,
        exclude: Option<RecordId>,
    ) -> Result<bool, CatalogRepositoryError>;

    /// Fetch a record with its links and ordered additional assets.
    async fn find_by_id(&self, id: RecordId)
    -> Result<Option<CatalogRecord>, CatalogRepositoryError>;

    /// Insert a record, its links and its asset references atomically.
    ///
    /// A unique violation on the inventory code is reported as
    /// [`CatalogRepositoryError::DuplicateCode`].
    async fn insert(&self, record: &NewCatalogRecord) -> Result<RecordId, CatalogRepositoryError>;

    /// Apply an edit guarded by the expected version.
    ///
    /// The record row is written with `version = expected + 1` only when
    /// exactly one row matches both `id` and `expected_version`; child rows
    /// are replaced in the same transaction and untouched otherwise.
    async fn apply_update(
        &self,
        changeset: &RecordChangeset,
    ) -> Result<ChangesetResult, CatalogRepositoryError>;

    /// Delete a record and, by cascade, its links and asset references.
    ///
    /// Returns the asset paths the record owned, or `None` when no such
    /// record existed.
    async fn delete(&self, id: RecordId) -> Result<Option<Vec<AssetPath>>, CatalogRepositoryError>;

    /// Every asset reference across all records, primary and additional.
    async fn list_asset_references(&self) -> Result<Vec<AssetReference>, CatalogRepositoryError>;

    /// Whether any record references a blob with this file name.
    async fn is_asset_referenced(&self, file_name: &str) -> Result<bool, CatalogRepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn duplicate_code_error_names_the_code() {
        let error = CatalogRepositoryError::duplicate_code("INV_IC2_0004");
        assert_eq!(error.to_string(), "inventory code INV_IC2_0004 is already in use");
    }
}
