//! Port for the flat directory of stored blobs.
//!
//! The [`AssetStore`] trait is the only access path to binary storage. Blobs
//! are addressed by file name; the store never interprets their content.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AssetPath, StoredAsset};

use super::define_port_error;

define_port_error! {
    /// Errors raised by asset store adapters.
    pub enum AssetStoreError {
        /// The named blob does not exist.
        NotFound { name: String } => "asset {name} does not exist",
        /// The name is unusable (empty, or escapes the store directory).
        InvalidName { name: String } => "asset name {name} is not allowed",
        /// Any other filesystem failure.
        Io { message: String } => "asset store I/O failed: {message}",
    }
}

/// Port for blob storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `bytes` under a freshly generated name derived from
    /// `suggested_name` and return the path to record on the owning record.
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetPath, AssetStoreError>;

    /// Delete a blob by file name and return the number of bytes freed.
    async fn delete(&self, name: &str) -> Result<u64, AssetStoreError>;

    /// Every blob currently present, with its size.
    async fn list(&self) -> Result<Vec<StoredAsset>, AssetStoreError>;
}

/// Keep only the final path component, replace every character outside
/// `[A-Za-z0-9._-]` with `_` and strip leading dots, so a user-supplied file
/// name cannot address other paths.
///
/// Returns `None` when nothing usable remains.
///
/// # Examples
/// ```
/// use inventory::domain::ports::sanitise_file_name;
///
/// assert_eq!(sanitise_file_name("../../etc/passwd").as_deref(), Some("passwd"));
/// assert_eq!(sanitise_file_name("Poste radio (1).JPG").as_deref(), Some("Poste_radio__1_.JPG"));
/// assert_eq!(sanitise_file_name("..."), None);
/// ```
pub fn sanitise_file_name(suggested: &str) -> Option<String> {
    let base = suggested.rsplit(['/', '\\']).next().unwrap_or(suggested);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned.to_owned())
    }
}

/// Generate a collision-free stored name: `<uuid-v4>_<sanitised name>`.
///
/// Returns `None` when the suggested name sanitises to nothing.
pub fn stored_asset_name(suggested: &str) -> Option<String> {
    sanitise_file_name(suggested).map(|name| format!("{}_{name}", Uuid::new_v4()))
}

/// Lower-cased extension of a file name, if any.
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
