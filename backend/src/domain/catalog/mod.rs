//! Catalog record model: identifiers, versions, fields, attributes and the
//! asset references a record owns.

mod assets;
mod attributes;
mod inventory_code;
mod record;

pub use assets::{
    AdditionalAsset, AssetPath, AssetPathValidationError, AssetReference, AssetSlot, AssetUpload,
    CaptionedUpload, StoredAsset,
};
pub use attributes::{
    AttributeInput, AttributeMap, AttributeValidationError, AttributeValue, DEFAULT_DISPLAY_ORDER,
};
pub use inventory_code::{CodeFormat, InventoryCode, InventoryCodeValidationError};
pub use record::{
    CatalogRecord, FieldValidationError, RecordDraft, RecordFields, RecordId, RecordVersion,
};
