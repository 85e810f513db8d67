//! Filesystem adapter for the asset store port.

mod directory_asset_store;

pub use directory_asset_store::DirectoryAssetStore;
