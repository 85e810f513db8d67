//! `AssetStore` over a single capability-scoped directory.
//!
//! All filesystem access goes through a `cap_std` [`Dir`], so a name can never
//! reach outside the asset directory even if validation were bypassed.
//! Blocking filesystem calls run on tokio's blocking pool.

use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::{Dir, File, OpenOptions};
use tracing::{debug, warn};

use crate::domain::ports::{AssetStore, AssetStoreError, stored_asset_name};
use crate::domain::{AssetPath, StoredAsset};

/// Flat directory of uploaded blobs.
///
/// Paths handed back by [`AssetStore::save`] are `<prefix>/<stored name>`,
/// where the prefix is the directory as configured (for example
/// `database/uploads`).
#[derive(Clone)]
pub struct DirectoryAssetStore {
    dir: Arc<Dir>,
    prefix: String,
}

impl DirectoryAssetStore {
    /// Wrap an already opened directory.
    pub fn new(dir: Dir, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            dir: Arc::new(dir),
            prefix: prefix.trim_end_matches(['/', '\\']).to_owned(),
        }
    }

    /// Create `path` if needed and open it; the recorded prefix is `path`
    /// itself.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the directory cannot be created
    /// or opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        Dir::create_ambient_dir_all(path, ambient_authority())?;
        let dir = Dir::open_ambient_dir(path, ambient_authority())?;
        Ok(Self::new(dir, path.to_string_lossy()))
    }

    fn stored_path(&self, name: &str) -> Result<AssetPath, AssetStoreError> {
        let raw = if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{name}", self.prefix)
        };
        AssetPath::new(raw).map_err(|_| AssetStoreError::invalid_name(name))
    }

    async fn blocking<T, F>(&self, task: F) -> Result<T, AssetStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Dir) -> Result<T, AssetStoreError> + Send + 'static,
    {
        let dir = Arc::clone(&self.dir);
        tokio::task::spawn_blocking(move || task(&dir))
            .await
            .map_err(|err| AssetStoreError::io(format!("asset task failed: {err}")))?
    }
}

/// A bare file name: no separators, not `.` or `..`.
fn validate_name(name: &str) -> Result<(), AssetStoreError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AssetStoreError::invalid_name(name));
    }
    Ok(())
}

/// Create `name`, which must not exist yet, and fill it with `write`.
///
/// When `write` fails the partly written file is removed again.
fn write_exclusive<W>(dir: &Dir, name: &str, write: W) -> io::Result<()>
where
    W: FnOnce(&mut File) -> io::Result<()>,
{
    let mut file = dir.open_with(name, OpenOptions::new().write(true).create_new(true))?;
    if let Err(err) = write(&mut file) {
        drop(file);
        if let Err(cleanup) = dir.remove_file(name) {
            warn!(name, error = %cleanup, "failed to remove partially written asset");
        }
        return Err(err);
    }
    Ok(())
}

fn map_io(name: &str, err: io::Error) -> AssetStoreError {
    if err.kind() == io::ErrorKind::NotFound {
        AssetStoreError::not_found(name)
    } else {
        AssetStoreError::io(format!("{name}: {err}"))
    }
}

#[async_trait]
impl AssetStore for DirectoryAssetStore {
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetPath, AssetStoreError> {
        let name = stored_asset_name(suggested_name)
            .ok_or_else(|| AssetStoreError::invalid_name(suggested_name))?;
        let path = self.stored_path(&name)?;
        let contents = bytes.to_vec();
        self.blocking(move |dir| {
            write_exclusive(dir, &name, |file| {
                file.write_all(&contents)?;
                file.sync_all()
            })
            .map_err(|err| map_io(&name, err))
        })
        .await?;
        debug!(path = %path, size = bytes.len(), "asset stored");
        Ok(path)
    }

    async fn delete(&self, name: &str) -> Result<u64, AssetStoreError> {
        validate_name(name)?;
        let name = name.to_owned();
        self.blocking(move |dir| {
            let metadata = dir.metadata(&name).map_err(|err| map_io(&name, err))?;
            if !metadata.is_file() {
                return Err(AssetStoreError::invalid_name(name));
            }
            dir.remove_file(&name).map_err(|err| map_io(&name, err))?;
            Ok(metadata.len())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<StoredAsset>, AssetStoreError> {
        self.blocking(|dir| {
            let listing_error = |err: io::Error| AssetStoreError::io(format!("list: {err}"));
            let mut assets = Vec::new();
            for entry in dir.entries().map_err(listing_error)? {
                let entry = entry.map_err(listing_error)?;
                let metadata = entry.metadata().map_err(listing_error)?;
                if !metadata.is_file() {
                    continue;
                }
                match entry.file_name().into_string() {
                    Ok(name) => assets.push(StoredAsset {
                        name,
                        size_bytes: metadata.len(),
                    }),
                    Err(raw) => warn!(name = ?raw, "skipping non UTF-8 file name"),
                }
            }
            assets.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(assets)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::cap_fs::ScratchDir;
    use rstest::{fixture, rstest};

    #[fixture]
    fn scratch() -> ScratchDir {
        ScratchDir::new().expect("scratch dir")
    }

    fn store(scratch: &ScratchDir) -> DirectoryAssetStore {
        DirectoryAssetStore::new(scratch.open().expect("dir handle"), "database/uploads/")
    }

    #[rstest]
    #[tokio::test]
    async fn save_writes_under_a_fresh_name(scratch: ScratchDir) {
        let store = store(&scratch);

        let path = store.save(b"jpeg", "Front view.jpg").await.expect("saved");

        assert!(path.as_str().starts_with("database/uploads/"));
        assert!(path.file_name().ends_with("_Front_view.jpg"));
        assert!(scratch.exists(path.file_name()));
    }

    #[rstest]
    #[tokio::test]
    async fn save_rejects_names_that_sanitise_to_nothing(scratch: ScratchDir) {
        let error = store(&scratch).save(b"x", "///").await.expect_err("rejected");
        assert!(matches!(error, AssetStoreError::InvalidName { .. }));
    }

    #[rstest]
    fn failed_writes_leave_no_partial_file(scratch: ScratchDir) {
        let dir = scratch.open().expect("dir handle");

        let error = write_exclusive(&dir, "half.jpg", |file| {
            file.write_all(b"half")?;
            Err(io::Error::other("device full"))
        })
        .expect_err("write fails");

        assert_eq!(error.to_string(), "device full");
        assert!(!scratch.exists("half.jpg"));
    }

    #[rstest]
    fn existing_files_are_never_replaced_or_removed(scratch: ScratchDir) {
        scratch.write("taken.jpg", b"original").expect("write");
        let dir = scratch.open().expect("dir handle");

        let error = write_exclusive(&dir, "taken.jpg", |file| file.write_all(b"new"))
            .expect_err("name taken");

        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
        assert!(scratch.exists("taken.jpg"));
        assert_eq!(dir.read("taken.jpg").expect("read"), b"original");
    }

    #[rstest]
    #[tokio::test]
    async fn delete_reports_bytes_freed(scratch: ScratchDir) {
        scratch.write("a.png", b"12345").expect("write");

        let freed = store(&scratch).delete("a.png").await.expect("deleted");

        assert_eq!(freed, 5);
        assert!(!scratch.exists("a.png"));
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_a_missing_file_is_not_found(scratch: ScratchDir) {
        let error = store(&scratch).delete("gone.png").await.expect_err("missing");
        assert!(matches!(error, AssetStoreError::NotFound { .. }));
    }

    #[rstest]
    #[case("../escape.png")]
    #[case("..")]
    #[case("")]
    #[tokio::test]
    async fn delete_refuses_paths(scratch: ScratchDir, #[case] name: &str) {
        let error = store(&scratch).delete(name).await.expect_err("refused");
        assert!(matches!(error, AssetStoreError::InvalidName { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn list_returns_sorted_regular_files(scratch: ScratchDir) {
        scratch.write("b.jpg", b"bb").expect("write");
        scratch.write("a.png", b"a").expect("write");
        scratch.open().expect("dir").create_dir("nested").expect("mkdir");

        let listed = store(&scratch).list().await.expect("listed");

        assert_eq!(
            listed,
            vec![
                StoredAsset { name: "a.png".to_owned(), size_bytes: 1 },
                StoredAsset { name: "b.jpg".to_owned(), size_bytes: 2 },
            ]
        );
    }
}
