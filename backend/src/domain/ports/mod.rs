//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Ports describe how the catalog services expect to interact with driven
//! adapters (the relational store and the asset directory). Each trait
//! exposes strongly typed errors so adapters map their failures into
//! predictable variants.

mod macros;
pub(crate) use macros::define_port_error;

mod asset_store;
mod catalog_repository;
mod login_attempt_repository;

#[cfg(test)]
pub use asset_store::MockAssetStore;
pub use asset_store::{
    AssetStore, AssetStoreError, file_extension, sanitise_file_name, stored_asset_name,
};
#[cfg(test)]
pub use catalog_repository::MockCatalogRepository;
pub use catalog_repository::{
    CatalogRepository, CatalogRepositoryError, ChangesetResult, NewAssetReference,
    NewCatalogRecord, RecordChangeset, RetainedAsset,
};
#[cfg(test)]
pub use login_attempt_repository::MockLoginAttemptRepository;
pub use login_attempt_repository::{LoginAttemptRepository, LoginAttemptRepositoryError};
