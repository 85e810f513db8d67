//! Domain primitives, services and ports.
//!
//! Purpose: keep the catalog's consistency rules independent of storage.
//! Services receive their collaborators as injected ports, so every rule can
//! be exercised against in-memory fakes.
//!
//! Public surface:
//! - [`IdentifierAllocator`]: lowest free inventory code, code uniqueness.
//! - [`CatalogRecordService`]: create, version-guarded update, delete.
//! - [`AssetGarbageCollector`]: orphan scan and best-effort collection.
//! - [`LoginThrottle`]: per-key lockout state machine.
//! - [`Error`] / [`ErrorCode`]: faults and rejected input.

pub mod asset_collector;
pub mod catalog;
pub mod error;
pub mod identifier_allocator;
pub mod login_throttle;
pub mod ports;
pub mod record_service;

pub use self::asset_collector::{
    AssetGarbageCollector, CollectionFailure, CollectionReport, DEFAULT_ALLOWED_EXTENSIONS,
    ScanReport, format_size, release_assets,
};
pub use self::catalog::{
    AdditionalAsset, AssetPath, AssetPathValidationError, AssetReference, AssetSlot, AssetUpload,
    AttributeInput, AttributeMap, AttributeValidationError, AttributeValue, CaptionedUpload,
    CatalogRecord, CodeFormat, DEFAULT_DISPLAY_ORDER, FieldValidationError, InventoryCode,
    InventoryCodeValidationError, RecordDraft, RecordFields, RecordId, RecordVersion, StoredAsset,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::identifier_allocator::{IdentifierAllocator, lowest_free_number};
pub use self::login_throttle::{
    AccessDecision, AttemptStatus, FailureOutcome, LOCKOUT_MINUTES, LoginAttemptKey,
    LoginAttemptKeyValidationError, LoginAttemptRecord, LoginThrottle, MAX_LOGIN_ATTEMPTS,
    RETENTION_DAYS, ThrottlePolicy,
};
pub use self::record_service::{
    CatalogRecordService, CreateOutcome, CreateRecordRequest, MAX_ALLOCATION_ATTEMPTS,
    PrimaryAssetChange, UpdateOutcome, UpdateRecordRequest,
};
