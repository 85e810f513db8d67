//! Binary assets (images) owned by catalog records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::RecordId;

/// Validation errors for [`AssetPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPathValidationError {
    /// The path was blank.
    Empty,
    /// The path does not end in a file name.
    MissingFileName,
}

impl fmt::Display for AssetPathValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "asset path must not be empty"),
            Self::MissingFileName => write!(f, "asset path must end in a file name"),
        }
    }
}

impl std::error::Error for AssetPathValidationError {}

/// Stored path of a blob, as recorded on a catalog record.
///
/// Paths may carry a directory prefix (`database/uploads/<name>`); the asset
/// store and the garbage collector only ever compare the final file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetPath(String);

impl AssetPath {
    /// Validate a stored path.
    ///
    /// # Examples
    /// ```
    /// use inventory::domain::AssetPath;
    ///
    /// let path = AssetPath::new("database/uploads/3f2a_radio.jpg").expect("valid path");
    /// assert_eq!(path.file_name(), "3f2a_radio.jpg");
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self, AssetPathValidationError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AssetPathValidationError::Empty);
        }
        if trimmed.ends_with('/') || trimmed.ends_with('\\') {
            return Err(AssetPathValidationError::MissingFileName);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Full stored path.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Final path component, the name the blob has inside the asset store.
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for AssetPath {
    type Error = AssetPathValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetPath> for String {
    fn from(value: AssetPath) -> Self {
        value.0
    }
}

/// Where on a record an asset reference lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSlot {
    /// The single primary image column.
    Primary,
    /// An entry in the ordered list of additional images.
    Additional,
}

/// A `(record, path, order)` tuple recording that a record owns a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    pub record_id: RecordId,
    pub path: AssetPath,
    pub slot: AssetSlot,
    /// Zero for the primary asset, list position for additional assets.
    pub position: u32,
}

/// An additional asset as attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalAsset {
    /// Surrogate key of the reference row.
    pub id: i64,
    pub path: AssetPath,
    pub caption: String,
    pub position: u32,
}

/// A blob physically present in the asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub name: String,
    pub size_bytes: u64,
}

/// Bytes submitted for storage together with the uploader's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpload {
    pub suggested_name: String,
    pub bytes: Vec<u8>,
}

impl AssetUpload {
    /// Build an upload from a file name and content.
    pub fn new(suggested_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            suggested_name: suggested_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// An additional image upload with its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionedUpload {
    pub upload: AssetUpload,
    pub caption: String,
}
