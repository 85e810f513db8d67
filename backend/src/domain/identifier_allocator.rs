//! Inventory code allocation.
//!
//! The next code is recomputed from the stored codes on every call; there is
//! no counter table. Numbers freed by deletions are therefore reused, and two
//! concurrent allocations may return the same code. The store's uniqueness
//! constraint rejects the second insert and callers re-allocate.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::domain::ports::{CatalogRepository, CatalogRepositoryError};
use crate::domain::{CodeFormat, Error, InventoryCode, RecordId};

/// Hands out the lowest unused inventory code.
#[derive(Clone)]
pub struct IdentifierAllocator<R> {
    repository: Arc<R>,
    format: CodeFormat,
}

impl<R> IdentifierAllocator<R> {
    /// Create an allocator over `repository` producing codes in `format`.
    pub fn new(repository: Arc<R>, format: CodeFormat) -> Self {
        Self { repository, format }
    }

    /// Code layout this allocator produces and recognises.
    pub fn format(&self) -> &CodeFormat {
        &self.format
    }
}

impl<R> IdentifierAllocator<R>
where
    R: CatalogRepository,
{
    /// Return the smallest code whose number no stored record uses.
    ///
    /// Stored codes that do not match the format exactly are ignored.
    ///
    /// # Errors
    /// Returns `ServiceUnavailable` when the store is unreachable or when
    /// every number the format can express is taken.
    pub async fn allocate_next(&self) -> Result<InventoryCode, Error> {
        let codes = self
            .repository
            .list_inventory_codes()
            .await
            .map_err(map_catalog_error)?;
        let used: BTreeSet<u32> = codes
            .iter()
            .filter_map(|code| self.format.parse_number(code))
            .collect();

        let number = lowest_free_number(&used);
        let code = self.format.format(number).ok_or_else(|| {
            Error::service_unavailable("inventory code space exhausted").with_details(json!({
                "code": "code_space_exhausted",
                "prefix": self.format.prefix(),
                "width": self.format.width(),
            }))
        })?;
        debug!(code = %code, in_use = used.len(), "allocated inventory code");
        Ok(code)
    }

    /// True when a record other than `exclude` already holds `code`.
    pub async fn exists(
        &self,
        code: &InventoryCode,
        exclude: Option<RecordId>,
    ) -> Result<bool, Error> {
        self.repository
            .code_exists(code, exclude)
            .await
            .map_err(map_catalog_error)
    }
}

/// Smallest non-negative integer missing from `used`.
///
/// # Examples
/// ```
/// use std::collections::BTreeSet;
/// use inventory::domain::lowest_free_number;
///
/// assert_eq!(lowest_free_number(&BTreeSet::from([3, 5])), 0);
/// assert_eq!(lowest_free_number(&BTreeSet::from([0, 1, 2, 3, 5])), 4);
/// ```
pub fn lowest_free_number(used: &BTreeSet<u32>) -> u32 {
    let mut candidate = 0_u32;
    for &number in used {
        if number != candidate {
            break;
        }
        candidate = candidate.saturating_add(1);
    }
    candidate
}

pub(crate) fn map_catalog_error(error: CatalogRepositoryError) -> Error {
    match error {
        CatalogRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("catalog store unavailable: {message}"))
        }
        CatalogRepositoryError::Query { message } => {
            Error::internal(format!("catalog store error: {message}"))
        }
        CatalogRepositoryError::DuplicateCode { code } => {
            Error::conflict(format!("inventory code {code} is already in use")).with_details(
                json!({
                    "code": "duplicate_code",
                    "inventoryCode": code,
                }),
            )
        }
    }
}
