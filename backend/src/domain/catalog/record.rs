//! Catalog records and their editable field set.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AdditionalAsset, AssetPath, AttributeInput, AttributeMap, InventoryCode};
use crate::domain::Error;

/// Durable surrogate key of a catalog record. Assigned once by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a key read from the store.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw key value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic concurrency stamp. Starts at zero and grows by exactly one per
/// committed update.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordVersion(u32);

impl RecordVersion {
    /// Version assigned on creation.
    pub const INITIAL: Self = Self(0);

    /// Wrap a stored version.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw version number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The version a successful update produces.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for RecordVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unvalidated record fields as submitted by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    pub name: String,
    pub description: String,
    pub category: String,
    pub manufacturer: String,
    pub manufactured_on: String,
    pub condition: String,
    pub origin: String,
    pub inventory_code: Option<String>,
    pub attributes: Vec<AttributeInput>,
    pub links: Vec<String>,
}

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValidationError {
    pub field: &'static str,
    pub message: String,
}

impl FieldValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for FieldValidationError {}

impl From<FieldValidationError> for Error {
    fn from(value: FieldValidationError) -> Self {
        Error::invalid_request(value.to_string()).with_details(json!({
            "field": value.field,
            "code": "validation_failed",
        }))
    }
}

/// Validated editable fields of a catalog record.
///
/// ## Invariants
/// - `name` and `category` are trimmed and non-empty;
/// - `links` contains no blank entries and keeps submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    pub name: String,
    pub description: String,
    pub category: String,
    pub manufacturer: String,
    pub manufactured_on: String,
    pub condition: String,
    pub origin: String,
    pub inventory_code: Option<InventoryCode>,
    pub attributes: AttributeMap,
    pub links: Vec<String>,
}

impl RecordFields {
    /// Validate a draft. Free-text content is not inspected beyond trimming.
    ///
    /// # Examples
    /// ```
    /// use inventory::domain::{RecordDraft, RecordFields};
    ///
    /// let draft = RecordDraft {
    ///     name: "Rolleiflex 2.8F".into(),
    ///     category: "Cameras".into(),
    ///     links: vec!["https://example.org/rollei".into(), "  ".into()],
    ///     ..Default::default()
    /// };
    /// let fields = RecordFields::validate(draft).expect("valid draft");
    /// assert_eq!(fields.links.len(), 1);
    /// assert!(fields.inventory_code.is_none());
    /// ```
    pub fn validate(draft: RecordDraft) -> Result<Self, FieldValidationError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(FieldValidationError::new("name", "name is required"));
        }
        let category = draft.category.trim();
        if category.is_empty() {
            return Err(FieldValidationError::new("category", "category is required"));
        }
        let inventory_code = InventoryCode::from_optional(draft.inventory_code.as_deref())
            .map_err(|err| FieldValidationError::new("inventoryCode", err.to_string()))?;
        let attributes = AttributeMap::from_inputs(draft.attributes)
            .map_err(|err| FieldValidationError::new("attributes", err.to_string()))?;
        let links = draft
            .links
            .iter()
            .map(|link| link.trim())
            .filter(|link| !link.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            name: name.to_owned(),
            description: draft.description.trim().to_owned(),
            category: category.to_owned(),
            manufacturer: draft.manufacturer.trim().to_owned(),
            manufactured_on: draft.manufactured_on.trim().to_owned(),
            condition: draft.condition.trim().to_owned(),
            origin: draft.origin.trim().to_owned(),
            inventory_code,
            attributes,
            links,
        })
    }
}

/// A versioned catalog record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: RecordId,
    pub fields: RecordFields,
    pub version: RecordVersion,
    pub primary_asset: Option<AssetPath>,
    pub additional_assets: Vec<AdditionalAsset>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    /// Every blob path this record owns, primary first.
    pub fn owned_assets(&self) -> Vec<AssetPath> {
        self.primary_asset
            .iter()
            .cloned()
            .chain(self.additional_assets.iter().map(|asset| asset.path.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn draft() -> RecordDraft {
        RecordDraft {
            name: " Philips BX998A ".to_owned(),
            category: "Radios".to_owned(),
            inventory_code: Some("INV_IC2_0003".to_owned()),
            ..RecordDraft::default()
        }
    }

    #[rstest]
    fn validate_trims_required_fields() {
        let fields = RecordFields::validate(draft()).expect("valid");
        assert_eq!(fields.name, "Philips BX998A");
        assert_eq!(
            fields.inventory_code.as_ref().map(InventoryCode::as_str),
            Some("INV_IC2_0003")
        );
    }

    #[rstest]
    #[case::missing_name(RecordDraft { name: "  ".into(), ..draft() }, "name")]
    #[case::missing_category(RecordDraft { category: String::new(), ..draft() }, "category")]
    fn validate_rejects_missing_required_fields(
        #[case] input: RecordDraft,
        #[case] field: &'static str,
    ) {
        let err = RecordFields::validate(input).expect_err("invalid");
        assert_eq!(err.field, field);

        let domain: Error = err.into();
        assert_eq!(domain.code(), crate::domain::ErrorCode::InvalidRequest);
        assert_eq!(domain.details().map(|d| d["field"].clone()), Some(json!(field)));
    }

    #[rstest]
    fn version_next_increments_by_one() {
        assert_eq!(RecordVersion::INITIAL.next(), RecordVersion::new(1));
        assert_eq!(RecordVersion::new(41).next().get(), 42);
    }
}
