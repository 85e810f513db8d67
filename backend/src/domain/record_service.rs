//! Catalog record lifecycle: create, optimistic update, delete.
//!
//! Updates follow a fixed order: validate the draft, load the record, check
//! a changed inventory code against other records, pre-check the version,
//! save any new blobs, then hand the whole edit to the repository as one
//! version-guarded changeset. Nothing touches the store before the version
//! check passes, and blobs saved for an attempt that did not apply are
//! released again.

use std::sync::Arc;

use mockable::Clock;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::asset_collector::release_assets;
use crate::domain::identifier_allocator::map_catalog_error;
use crate::domain::ports::{
    AssetStore, CatalogRepository, CatalogRepositoryError, ChangesetResult, NewAssetReference,
    NewCatalogRecord, RecordChangeset, RetainedAsset,
};
use crate::domain::{
    AssetPath, AssetUpload, CaptionedUpload, CatalogRecord, Error, IdentifierAllocator,
    InventoryCode, RecordDraft, RecordFields, RecordId, RecordVersion,
};

/// Attempts [`CatalogRecordService::create_with_next_code`] makes before
/// giving up on a contended code space.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

/// Input for creating a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRecordRequest {
    pub draft: RecordDraft,
    pub primary_upload: Option<AssetUpload>,
    pub additional_uploads: Vec<CaptionedUpload>,
}

/// What an edit does to the primary asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrimaryAssetChange {
    #[default]
    Keep,
    Replace(AssetUpload),
    Remove,
}

/// Input for editing a record the caller last read at `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecordRequest {
    pub id: RecordId,
    pub expected_version: RecordVersion,
    /// A missing inventory code keeps the stored one.
    pub draft: RecordDraft,
    pub primary: PrimaryAssetChange,
    /// Existing additional assets to keep, in their new order.
    pub retained_assets: Vec<RetainedAsset>,
    pub new_uploads: Vec<CaptionedUpload>,
}

/// Result of [`CatalogRecordService::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created {
        id: RecordId,
        code: InventoryCode,
    },
    /// The code belongs to another record; nothing was stored.
    DuplicateCode {
        rejected: InventoryCode,
        suggested: InventoryCode,
    },
}

/// Result of [`CatalogRecordService::try_update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Applied {
        version: RecordVersion,
    },
    /// Another writer got there first. Nothing was written; the caller should
    /// re-read the record and re-present it.
    Conflict {
        expected: RecordVersion,
        current: RecordVersion,
    },
    /// The requested code belongs to another record. Nothing was written.
    DuplicateCode {
        rejected: InventoryCode,
        suggested: InventoryCode,
    },
}

#[derive(Debug, Default)]
struct SavedAssets {
    primary: Option<AssetPath>,
    additional: Vec<NewAssetReference>,
}

impl SavedAssets {
    fn paths(&self) -> Vec<AssetPath> {
        self.primary
            .iter()
            .cloned()
            .chain(self.additional.iter().map(|asset| asset.path.clone()))
            .collect()
    }
}

/// Service owning record writes and the blobs they reference.
#[derive(Clone)]
pub struct CatalogRecordService<R, A> {
    repository: Arc<R>,
    assets: Arc<A>,
    allocator: IdentifierAllocator<R>,
    clock: Arc<dyn Clock>,
}

impl<R, A> CatalogRecordService<R, A> {
    /// Create a service sharing `allocator`'s repository.
    pub fn new(
        repository: Arc<R>,
        assets: Arc<A>,
        allocator: IdentifierAllocator<R>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            assets,
            allocator,
            clock,
        }
    }

    /// Allocator used for suggestions and automatic codes.
    pub fn allocator(&self) -> &IdentifierAllocator<R> {
        &self.allocator
    }
}

impl<R, A> CatalogRecordService<R, A>
where
    R: CatalogRepository,
    A: AssetStore,
{
    /// Fetch a record by id.
    pub async fn fetch(&self, id: RecordId) -> Result<CatalogRecord, Error> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(map_catalog_error)?
            .ok_or_else(|| record_not_found(id))
    }

    /// Create a record under the inventory code the caller supplied.
    ///
    /// A code already in use, whether caught by the up-front check or by the
    /// store's uniqueness constraint at insert time, yields
    /// [`CreateOutcome::DuplicateCode`] with a fresh suggestion.
    pub async fn create(&self, request: CreateRecordRequest) -> Result<CreateOutcome, Error> {
        let fields = RecordFields::validate(request.draft)?;
        let Some(code) = fields.inventory_code.clone() else {
            return Err(Error::invalid_request("inventory code is required").with_details(
                serde_json::json!({ "field": "inventoryCode", "code": "validation_failed" }),
            ));
        };

        if self.allocator.exists(&code, None).await? {
            return self.duplicate_on_create(code).await;
        }

        let saved = self
            .save_uploads(request.primary_upload.as_ref(), &request.additional_uploads)
            .await;
        match self.insert(fields, &saved).await {
            Ok(id) => {
                info!(record_id = %id, code = %code, "catalog record created");
                Ok(CreateOutcome::Created { id, code })
            }
            Err(CatalogRepositoryError::DuplicateCode { .. }) => {
                release_assets(self.assets.as_ref(), &saved.paths()).await;
                self.duplicate_on_create(code).await
            }
            Err(err) => {
                release_assets(self.assets.as_ref(), &saved.paths()).await;
                Err(map_catalog_error(err))
            }
        }
    }

    /// Create a record under a freshly allocated code, ignoring any code in
    /// the draft.
    ///
    /// Meant for callers that never showed the code to a person. A code
    /// claimed concurrently between allocation and insert is re-allocated, up
    /// to [`MAX_ALLOCATION_ATTEMPTS`] times.
    pub async fn create_with_next_code(
        &self,
        mut request: CreateRecordRequest,
    ) -> Result<CreateOutcome, Error> {
        request.draft.inventory_code = None;
        let mut fields = RecordFields::validate(request.draft)?;
        let saved = self
            .save_uploads(request.primary_upload.as_ref(), &request.additional_uploads)
            .await;

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let code = match self.allocator.allocate_next().await {
                Ok(code) => code,
                Err(err) => {
                    release_assets(self.assets.as_ref(), &saved.paths()).await;
                    return Err(err);
                }
            };
            fields.inventory_code = Some(code.clone());
            match self.insert(fields.clone(), &saved).await {
                Ok(id) => {
                    info!(record_id = %id, code = %code, attempt, "catalog record created");
                    return Ok(CreateOutcome::Created { id, code });
                }
                Err(CatalogRepositoryError::DuplicateCode { .. }) => {
                    warn!(code = %code, attempt, "allocated code was claimed concurrently");
                }
                Err(err) => {
                    release_assets(self.assets.as_ref(), &saved.paths()).await;
                    return Err(map_catalog_error(err));
                }
            }
        }

        release_assets(self.assets.as_ref(), &saved.paths()).await;
        Err(Error::conflict("could not allocate a free inventory code").with_details(
            serde_json::json!({
                "code": "allocation_contended",
                "attempts": MAX_ALLOCATION_ATTEMPTS,
            }),
        ))
    }

    /// Apply an edit if the record is still at `expected_version`.
    pub async fn try_update(&self, request: UpdateRecordRequest) -> Result<UpdateOutcome, Error> {
        let UpdateRecordRequest {
            id,
            expected_version,
            draft,
            primary,
            retained_assets,
            new_uploads,
        } = request;
        let mut fields = RecordFields::validate(draft)?;
        let existing = self.fetch(id).await?;

        match fields.inventory_code.clone() {
            None => fields.inventory_code = existing.fields.inventory_code.clone(),
            Some(code) if existing.fields.inventory_code.as_ref() != Some(&code) => {
                if self.allocator.exists(&code, Some(id)).await? {
                    let suggested = self.allocator.allocate_next().await?;
                    warn!(record_id = %id, code = %code, suggested = %suggested, "inventory code already in use");
                    return Ok(UpdateOutcome::DuplicateCode {
                        rejected: code,
                        suggested,
                    });
                }
            }
            Some(_) => {}
        }

        if existing.version != expected_version {
            warn!(record_id = %id, expected = %expected_version, current = %existing.version, "stale edit rejected");
            return Ok(UpdateOutcome::Conflict {
                expected: expected_version,
                current: existing.version,
            });
        }

        let replacement = match &primary {
            PrimaryAssetChange::Replace(upload) => Some(upload),
            PrimaryAssetChange::Keep | PrimaryAssetChange::Remove => None,
        };
        let saved = self.save_uploads(replacement, &new_uploads).await;
        let primary_asset = match (&primary, &saved.primary) {
            (PrimaryAssetChange::Remove, _) => None,
            (PrimaryAssetChange::Replace(_), Some(path)) => Some(path.clone()),
            _ => existing.primary_asset.clone(),
        };

        let changeset = RecordChangeset {
            id,
            expected_version,
            fields,
            primary_asset,
            retained_assets,
            new_assets: saved.additional.clone(),
            updated_at: self.clock.utc(),
        };

        let result = match self.repository.apply_update(&changeset).await {
            Ok(result) => result,
            Err(err) => {
                release_assets(self.assets.as_ref(), &saved.paths()).await;
                return match err {
                    CatalogRepositoryError::DuplicateCode { code } => {
                        self.duplicate_on_update(id, code).await
                    }
                    other => Err(map_catalog_error(other)),
                };
            }
        };

        match result {
            ChangesetResult::Applied { version, released } => {
                release_assets(self.assets.as_ref(), &released).await;
                info!(record_id = %id, version = %version, released = released.len(), "catalog record updated");
                Ok(UpdateOutcome::Applied { version })
            }
            ChangesetResult::VersionMismatch { current } => {
                release_assets(self.assets.as_ref(), &saved.paths()).await;
                let Some(current) = current else {
                    return Err(record_not_found(id));
                };
                warn!(record_id = %id, expected = %expected_version, current = %current, "concurrent edit won the race");
                Ok(UpdateOutcome::Conflict {
                    expected: expected_version,
                    current,
                })
            }
        }
    }

    /// Delete a record and release the blobs it owned.
    ///
    /// Blob release is best effort. The metadata delete stands even when a
    /// blob cannot be removed; a later collection pass picks it up.
    pub async fn delete(&self, id: RecordId) -> Result<(), Error> {
        let released = self
            .repository
            .delete(id)
            .await
            .map_err(map_catalog_error)?
            .ok_or_else(|| record_not_found(id))?;
        let bytes_freed = release_assets(self.assets.as_ref(), &released).await;
        info!(record_id = %id, assets = released.len(), bytes_freed, "catalog record deleted");
        Ok(())
    }

    async fn insert(
        &self,
        fields: RecordFields,
        saved: &SavedAssets,
    ) -> Result<RecordId, CatalogRepositoryError> {
        let record = NewCatalogRecord {
            fields,
            primary_asset: saved.primary.clone(),
            additional_assets: saved.additional.clone(),
            created_at: self.clock.utc(),
        };
        self.repository.insert(&record).await
    }

    async fn duplicate_on_create(&self, rejected: InventoryCode) -> Result<CreateOutcome, Error> {
        let suggested = self.allocator.allocate_next().await?;
        warn!(code = %rejected, suggested = %suggested, "inventory code already in use");
        Ok(CreateOutcome::DuplicateCode {
            rejected,
            suggested,
        })
    }

    async fn duplicate_on_update(&self, id: RecordId, code: String) -> Result<UpdateOutcome, Error> {
        let rejected = InventoryCode::new(code)
            .map_err(|err| Error::internal(format!("store reported an invalid code: {err}")))?;
        let suggested = self.allocator.allocate_next().await?;
        warn!(record_id = %id, code = %rejected, suggested = %suggested, "inventory code claimed concurrently");
        Ok(UpdateOutcome::DuplicateCode {
            rejected,
            suggested,
        })
    }

    async fn save_uploads(
        &self,
        primary: Option<&AssetUpload>,
        additional: &[CaptionedUpload],
    ) -> SavedAssets {
        let mut saved = SavedAssets::default();
        if let Some(upload) = primary {
            saved.primary = self.save_upload(upload).await;
        }
        for entry in additional {
            if let Some(path) = self.save_upload(&entry.upload).await {
                saved.additional.push(NewAssetReference {
                    path,
                    caption: entry.caption.trim().to_owned(),
                });
            }
        }
        saved
    }

    async fn save_upload(&self, upload: &AssetUpload) -> Option<AssetPath> {
        match self
            .assets
            .save(&upload.bytes, &upload.suggested_name)
            .await
        {
            Ok(path) => Some(path),
            Err(err) => {
                error!(file = %upload.suggested_name, error = %err, "asset save failed; continuing without it");
                None
            }
        }
    }
}

fn record_not_found(id: RecordId) -> Error {
    Error::not_found(format!("catalog record {id} not found"))
        .with_details(serde_json::json!({ "recordId": id.get() }))
}

#[cfg(test)]
#[path = "record_service_tests.rs"]
mod tests;
