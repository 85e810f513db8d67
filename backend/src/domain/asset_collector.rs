//! Orphaned blob detection and collection.
//!
//! The mark phase lists the asset store and every asset reference, compares
//! them by file name and calls whatever is present but unreferenced an
//! orphan. Only files carrying an allowed image extension count as present,
//! so unrelated files in the directory are never touched.
//!
//! Collection is not atomic with respect to concurrent edits. A reference
//! added after the mark phase could point at a blob already marked. Each
//! orphan is therefore re-checked against the store immediately before it is
//! deleted, which narrows that window without closing it. Run at most one
//! collection pass at a time.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::identifier_allocator::map_catalog_error;
use crate::domain::ports::{AssetStore, AssetStoreError, CatalogRepository, file_extension};
use crate::domain::{AssetPath, Error, StoredAsset};

/// Extensions treated as collectable images when none are configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Read-only mark phase result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Image blobs physically present, sorted by name.
    pub files_in_store: Vec<StoredAsset>,
    /// File names reachable from any record.
    pub files_referenced: BTreeSet<String>,
    /// Present blobs no record references, sorted by name.
    pub orphans: Vec<StoredAsset>,
}

impl ScanReport {
    /// Bytes a collection pass would free if nothing changes meanwhile.
    pub fn orphan_bytes(&self) -> u64 {
        self.orphans.iter().map(|asset| asset.size_bytes).sum()
    }
}

/// A blob that could not be collected, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFailure {
    /// File name, or empty when the mark phase itself failed.
    pub name: String,
    pub message: String,
}

/// Outcome of a collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub deleted: Vec<String>,
    pub bytes_freed: u64,
    /// Orphans that became referenced between marking and deletion.
    pub skipped: Vec<String>,
    pub errors: Vec<CollectionFailure>,
}

/// Reconciles the asset store against the catalog's references.
#[derive(Clone)]
pub struct AssetGarbageCollector<R, A> {
    repository: Arc<R>,
    assets: Arc<A>,
    allowed_extensions: BTreeSet<String>,
}

impl<R, A> AssetGarbageCollector<R, A> {
    /// Create a collector considering files with `allowed_extensions`
    /// (case-insensitive, without the dot).
    pub fn new<I, S>(repository: Arc<R>, assets: Arc<A>, allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            repository,
            assets,
            allowed_extensions,
        }
    }

    fn is_collectable(&self, name: &str) -> bool {
        file_extension(name).is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }
}

impl<R, A> AssetGarbageCollector<R, A>
where
    R: CatalogRepository,
    A: AssetStore,
{
    /// Compute present, referenced and orphaned blobs without changing
    /// anything.
    pub async fn scan(&self) -> Result<ScanReport, Error> {
        let mut files_in_store: Vec<StoredAsset> = self
            .assets
            .list()
            .await
            .map_err(map_asset_error)?
            .into_iter()
            .filter(|asset| self.is_collectable(&asset.name))
            .collect();
        files_in_store.sort_by(|left, right| left.name.cmp(&right.name));

        let files_referenced: BTreeSet<String> = self
            .repository
            .list_asset_references()
            .await
            .map_err(map_catalog_error)?
            .into_iter()
            .map(|reference| reference.path.file_name().to_owned())
            .collect();

        let orphans = files_in_store
            .iter()
            .filter(|asset| !files_referenced.contains(&asset.name))
            .cloned()
            .collect();

        Ok(ScanReport {
            files_in_store,
            files_referenced,
            orphans,
        })
    }

    /// Delete every orphan, best effort.
    ///
    /// Never fails: a mark phase that cannot run, or a blob that cannot be
    /// deleted, is recorded in [`CollectionReport::errors`] and the pass
    /// carries on with the remaining orphans.
    pub async fn collect(&self) -> CollectionReport {
        let mut report = CollectionReport::default();
        let scan = match self.scan().await {
            Ok(scan) => scan,
            Err(err) => {
                error!(error = %err, "asset collection could not mark orphans");
                report.errors.push(CollectionFailure {
                    name: String::new(),
                    message: err.message().to_owned(),
                });
                return report;
            }
        };
        info!(
            orphans = scan.orphans.len(),
            size = %format_size(scan.orphan_bytes()),
            "asset collection started"
        );

        for orphan in &scan.orphans {
            match self.repository.is_asset_referenced(&orphan.name).await {
                Ok(true) => {
                    warn!(file = %orphan.name, "orphan became referenced; skipped");
                    report.skipped.push(orphan.name.clone());
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    report.errors.push(CollectionFailure {
                        name: orphan.name.clone(),
                        message: format!("reference check failed: {err}"),
                    });
                    continue;
                }
            }

            match self.assets.delete(&orphan.name).await {
                Ok(bytes) => {
                    debug!(file = %orphan.name, bytes, "orphan deleted");
                    report.bytes_freed += bytes;
                    report.deleted.push(orphan.name.clone());
                }
                Err(err) => {
                    error!(file = %orphan.name, error = %err, "orphan deletion failed");
                    report.errors.push(CollectionFailure {
                        name: orphan.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            freed = %format_size(report.bytes_freed),
            "asset collection finished"
        );
        report
    }
}

/// Remove the blobs behind `paths` right away, returning the bytes freed.
///
/// Failures are logged and otherwise ignored: the metadata change that
/// released these paths stands, and anything left behind is found by the
/// next collection pass.
pub async fn release_assets<A>(store: &A, paths: &[AssetPath]) -> u64
where
    A: AssetStore + ?Sized,
{
    let mut freed = 0;
    for path in paths {
        match store.delete(path.file_name()).await {
            Ok(bytes) => freed += bytes,
            Err(AssetStoreError::NotFound { name }) => {
                debug!(file = %name, "released asset was already gone");
            }
            Err(err) => {
                error!(file = %path, error = %err, "failed to release asset");
            }
        }
    }
    freed
}

/// Render a byte count for operators.
///
/// # Examples
/// ```
/// use inventory::domain::format_size;
///
/// assert_eq!(format_size(512), "512 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * KIB;
    let scaled = |unit: u64| {
        let hundredths = (u128::from(bytes) * 100 + u128::from(unit) / 2) / u128::from(unit);
        format!("{}.{:02}", hundredths / 100, hundredths % 100)
    };
    match bytes {
        b if b < KIB => format!("{b} bytes"),
        b if b < MIB => format!("{} KB", scaled(KIB)),
        _ => format!("{} MB", scaled(MIB)),
    }
}

fn map_asset_error(error: AssetStoreError) -> Error {
    Error::service_unavailable(format!("asset store unavailable: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CatalogRepositoryError, MockAssetStore, MockCatalogRepository};
    use crate::domain::{AssetReference, AssetSlot, RecordId};
    use rstest::rstest;

    fn stored(name: &str, size_bytes: u64) -> StoredAsset {
        StoredAsset {
            name: name.to_owned(),
            size_bytes,
        }
    }

    fn reference(path: &str) -> AssetReference {
        AssetReference {
            record_id: RecordId::new(1),
            path: AssetPath::new(path).expect("valid path"),
            slot: AssetSlot::Primary,
            position: 0,
        }
    }

    fn collector(
        repository: MockCatalogRepository,
        assets: MockAssetStore,
    ) -> AssetGarbageCollector<MockCatalogRepository, MockAssetStore> {
        AssetGarbageCollector::new(Arc::new(repository), Arc::new(assets), DEFAULT_ALLOWED_EXTENSIONS)
    }

    #[rstest]
    #[case(0, "0 bytes")]
    #[case(1023, "1023 bytes")]
    #[case(1024, "1.00 KB")]
    #[case(1_048_575, "1024.00 KB")]
    #[case(3 * 1024 * 1024 + 512 * 1024, "3.50 MB")]
    fn sizes_are_human_readable(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }

    #[tokio::test]
    async fn scan_compares_by_file_name_and_ignores_other_extensions() {
        let mut assets = MockAssetStore::new();
        assets.expect_list().returning(|| {
            Ok(vec![
                stored("b_radio.JPG", 10),
                stored("a_orphan.png", 20),
                stored("notes.txt", 30),
            ])
        });
        let mut repository = MockCatalogRepository::new();
        repository
            .expect_list_asset_references()
            .returning(|| Ok(vec![reference("database/uploads/b_radio.JPG")]));

        let report = collector(repository, assets).scan().await.expect("scan succeeds");
        let present: Vec<&str> = report.files_in_store.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(present, ["a_orphan.png", "b_radio.JPG"]);
        assert_eq!(report.orphans, vec![stored("a_orphan.png", 20)]);
        assert_eq!(report.orphan_bytes(), 20);
    }

    #[tokio::test]
    async fn collect_skips_orphans_referenced_after_marking() {
        let mut assets = MockAssetStore::new();
        assets
            .expect_list()
            .returning(|| Ok(vec![stored("late.png", 5), stored("gone.png", 7)]));
        assets
            .expect_delete()
            .withf(|name| name == "gone.png")
            .times(1)
            .returning(|_| Ok(7));
        let mut repository = MockCatalogRepository::new();
        repository
            .expect_list_asset_references()
            .returning(|| Ok(Vec::new()));
        repository
            .expect_is_asset_referenced()
            .returning(|name| Ok(name == "late.png"));

        let report = collector(repository, assets).collect().await;
        assert_eq!(report.deleted, vec!["gone.png".to_owned()]);
        assert_eq!(report.skipped, vec!["late.png".to_owned()]);
        assert_eq!(report.bytes_freed, 7);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn collect_continues_past_failed_deletions() {
        let mut assets = MockAssetStore::new();
        assets
            .expect_list()
            .returning(|| Ok(vec![stored("a.png", 1), stored("b.png", 2)]));
        assets.expect_delete().returning(|name| {
            if name == "a.png" {
                Err(AssetStoreError::not_found(name))
            } else {
                Ok(2)
            }
        });
        let mut repository = MockCatalogRepository::new();
        repository
            .expect_list_asset_references()
            .returning(|| Ok(Vec::new()));
        repository
            .expect_is_asset_referenced()
            .returning(|_| Ok(false));

        let report = collector(repository, assets).collect().await;
        assert_eq!(report.deleted, vec!["b.png".to_owned()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "a.png");
    }

    #[tokio::test]
    async fn collect_reports_an_unreachable_store_instead_of_failing() {
        let mut assets = MockAssetStore::new();
        assets.expect_list().returning(|| Ok(vec![stored("a.png", 1)]));
        assets.expect_delete().never();
        let mut repository = MockCatalogRepository::new();
        repository
            .expect_list_asset_references()
            .returning(|| Err(CatalogRepositoryError::connection("refused")));

        let report = collector(repository, assets).collect().await;
        assert!(report.deleted.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn release_ignores_missing_blobs() {
        let mut assets = MockAssetStore::new();
        assets.expect_delete().returning(|name| match name {
            "kept.png" => Ok(40),
            other => Err(AssetStoreError::not_found(other)),
        });
        let paths = [
            AssetPath::new("database/uploads/kept.png").expect("valid"),
            AssetPath::new("database/uploads/missing.png").expect("valid"),
        ];

        assert_eq!(release_assets(&assets, &paths).await, 40);
    }
}
