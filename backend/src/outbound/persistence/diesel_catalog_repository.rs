//! PostgreSQL-backed `CatalogRepository` implementation using Diesel ORM.
//!
//! Record rows carry the optimistic concurrency `version`; links and
//! additional assets live in child tables removed by `ON DELETE CASCADE`.
//! Every multi-statement write runs in one transaction, so a changeset either
//! lands completely or not at all.

use std::future::Future;

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::expression_methods::EscapeExpressionMethods;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use tracing::{debug, warn};

use crate::domain::ports::{
    CatalogRepository, CatalogRepositoryError, ChangesetResult, NewAssetReference,
    NewCatalogRecord, RecordChangeset,
};
use crate::domain::{
    AdditionalAsset, AssetPath, AssetReference, AssetSlot, AttributeMap, CatalogRecord,
    InventoryCode, RecordFields, RecordId, RecordVersion,
};

use super::diesel_error_mapping::{
    is_unique_violation_of, map_basic_diesel_error, map_basic_pool_error,
};
use super::models::{
    CatalogRecordRow, CatalogRecordUpdate, NewCatalogRecordRow, NewRecordAssetRow,
    NewRecordLinkRow, RecordAssetRow, RecordLinkRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{catalog_records, record_assets, record_links};

/// Name of the unique constraint on `catalog_records.inventory_code`.
const INVENTORY_CODE_CONSTRAINT: &str = "catalog_records_inventory_code_key";

/// Diesel-backed implementation of the `CatalogRepository` port.
#[derive(Clone)]
pub struct DieselCatalogRepository {
    pool: DbPool,
}

impl DieselCatalogRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run one store access under the pool's query timeout.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, CatalogRepositoryError>> + Send,
    ) -> Result<T, CatalogRepositoryError> {
        self.pool.bounded(operation).await.map_err(map_pool_error)?
    }
}

fn map_pool_error(error: PoolError) -> CatalogRepositoryError {
    map_basic_pool_error(error, |message| CatalogRepositoryError::connection(message))
}

fn map_diesel_error(error: diesel::result::Error) -> CatalogRepositoryError {
    map_basic_diesel_error(
        error,
        CatalogRepositoryError::query,
        CatalogRepositoryError::connection,
    )
}

/// Map a write error, recognising a clash on the inventory code.
fn map_write_error(
    error: diesel::result::Error,
    code: Option<&InventoryCode>,
) -> CatalogRepositoryError {
    match code {
        Some(code) if is_unique_violation_of(&error, INVENTORY_CODE_CONSTRAINT) => {
            debug!(code = %code, "inventory code unique violation");
            CatalogRepositoryError::duplicate_code(code.as_str())
        }
        _ => map_diesel_error(error),
    }
}

fn to_db_int(value: impl TryInto<i32>, what: &str) -> Result<i32, CatalogRepositoryError> {
    value
        .try_into()
        .map_err(|_| CatalogRepositoryError::query(format!("{what} exceeds the storable range")))
}

fn from_db_int(value: i32, what: &str) -> Result<u32, CatalogRepositoryError> {
    u32::try_from(value)
        .map_err(|_| CatalogRepositoryError::query(format!("negative {what} in database")))
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> CatalogRepositoryError {
    CatalogRepositoryError::query(format!("corrupted {what} in database: {err}"))
}

/// Link URLs paired with their list position.
fn positioned_links(fields: &RecordFields) -> Result<Vec<(&str, i32)>, CatalogRepositoryError> {
    fields
        .links
        .iter()
        .enumerate()
        .map(|(index, url)| Ok((url.as_str(), to_db_int(index, "link position")?)))
        .collect()
}

/// New asset references paired with their list position, starting at
/// `offset`.
fn positioned_assets(
    assets: &[NewAssetReference],
    offset: usize,
) -> Result<Vec<(&str, &str, i32)>, CatalogRepositoryError> {
    assets
        .iter()
        .enumerate()
        .map(|(index, asset)| {
            let position = to_db_int(offset + index, "asset position")?;
            Ok((asset.path.as_str(), asset.caption.as_str(), position))
        })
        .collect()
}

fn serialise_attributes(fields: &RecordFields) -> Result<serde_json::Value, CatalogRepositoryError> {
    serde_json::to_value(&fields.attributes)
        .map_err(|err| CatalogRepositoryError::query(format!("serialise attributes: {err}")))
}

fn row_to_record(
    row: CatalogRecordRow,
    links: Vec<RecordLinkRow>,
    assets: Vec<RecordAssetRow>,
) -> Result<CatalogRecord, CatalogRepositoryError> {
    let inventory_code = InventoryCode::from_optional(row.inventory_code.as_deref())
        .map_err(|err| corrupt("inventory code", err))?;
    let attributes: AttributeMap =
        serde_json::from_value(row.attributes).map_err(|err| corrupt("attributes", err))?;
    let primary_asset = row
        .primary_asset
        .map(AssetPath::new)
        .transpose()
        .map_err(|err| corrupt("primary asset path", err))?;
    let additional_assets = assets
        .into_iter()
        .map(|asset| {
            Ok(AdditionalAsset {
                id: asset.id,
                path: AssetPath::new(asset.path).map_err(|err| corrupt("asset path", err))?,
                caption: asset.caption,
                position: from_db_int(asset.position, "asset position")?,
            })
        })
        .collect::<Result<Vec<_>, CatalogRepositoryError>>()?;

    Ok(CatalogRecord {
        id: RecordId::new(row.id),
        fields: RecordFields {
            name: row.name,
            description: row.description,
            category: row.category,
            manufacturer: row.manufacturer,
            manufactured_on: row.manufactured_on,
            condition: row.condition,
            origin: row.origin,
            inventory_code,
            attributes,
            links: links.into_iter().map(|link| link.url).collect(),
        },
        version: RecordVersion::new(from_db_int(row.version, "version")?),
        primary_asset,
        additional_assets,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn insert_links(
    conn: &mut AsyncPgConnection,
    record_id: i64,
    links: &[(&str, i32)],
) -> QueryResult<()> {
    if links.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewRecordLinkRow<'_>> = links
        .iter()
        .map(|&(url, position)| NewRecordLinkRow {
            record_id,
            url,
            position,
        })
        .collect();
    diesel::insert_into(record_links::table)
        .values(&rows)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_assets(
    conn: &mut AsyncPgConnection,
    record_id: i64,
    assets: &[(&str, &str, i32)],
) -> QueryResult<()> {
    if assets.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewRecordAssetRow<'_>> = assets
        .iter()
        .map(|&(path, caption, position)| NewRecordAssetRow {
            record_id,
            path,
            caption,
            position,
        })
        .collect();
    diesel::insert_into(record_assets::table)
        .values(&rows)
        .execute(conn)
        .await?;
    Ok(())
}

/// What the changeset transaction observed, before conversion to domain
/// types.
enum ChangesetRows {
    Applied { version: i32, released: Vec<String> },
    Mismatch { current: Option<i32> },
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CatalogRepository for DieselCatalogRepository {
    async fn list_inventory_codes(&self) -> Result<Vec<String>, CatalogRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let codes: Vec<Option<String>> = catalog_records::table
                .filter(catalog_records::inventory_code.is_not_null())
                .select(catalog_records::inventory_code)
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            Ok(codes.into_iter().flatten().collect())
        })
        .await
    }

    async fn code_exists(
        &self,
        code: &InventoryCode,
        exclude: Option<RecordId>,
    ) -> Result<bool, CatalogRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let mut query = catalog_records::table
                .select(catalog_records::id)
                .filter(catalog_records::inventory_code.eq(code.as_str()))
                .into_boxed();
            if let Some(exclude) = exclude {
                query = query.filter(catalog_records::id.ne(exclude.get()));
            }
            let hit: Option<i64> = query
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel_error)?;
            Ok(hit.is_some())
        })
        .await
    }

    async fn find_by_id(
        &self,
        id: RecordId,
    ) -> Result<Option<CatalogRecord>, CatalogRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let Some(row) = catalog_records::table
                .find(id.get())
                .select(CatalogRecordRow::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map_err(map_diesel_error)?
            else {
                return Ok(None);
            };

            let links: Vec<RecordLinkRow> = record_links::table
                .filter(record_links::record_id.eq(id.get()))
                .order((record_links::position.asc(), record_links::id.asc()))
                .select(RecordLinkRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            let assets: Vec<RecordAssetRow> = record_assets::table
                .filter(record_assets::record_id.eq(id.get()))
                .order((record_assets::position.asc(), record_assets::id.asc()))
                .select(RecordAssetRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;

            row_to_record(row, links, assets).map(Some)
        })
        .await
    }

    async fn insert(&self, record: &NewCatalogRecord) -> Result<RecordId, CatalogRepositoryError> {
        self.bounded(async {
            let fields = &record.fields;
            let new_row = NewCatalogRecordRow {
                inventory_code: fields.inventory_code.as_ref().map(InventoryCode::as_str),
                name: &fields.name,
                description: &fields.description,
                category: &fields.category,
                manufacturer: &fields.manufacturer,
                manufactured_on: &fields.manufactured_on,
                condition: &fields.condition,
                origin: &fields.origin,
                attributes: serialise_attributes(fields)?,
                primary_asset: record.primary_asset.as_ref().map(AssetPath::as_str),
                version: to_db_int(RecordVersion::INITIAL.get(), "version")?,
                created_at: record.created_at,
            };
            let links = positioned_links(fields)?;
            let assets = positioned_assets(&record.additional_assets, 0)?;
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;

            let id = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        let id: i64 = diesel::insert_into(catalog_records::table)
                            .values(&new_row)
                            .returning(catalog_records::id)
                            .get_result(conn)
                            .await?;
                        insert_links(conn, id, &links).await?;
                        insert_assets(conn, id, &assets).await?;
                        Ok(id)
                    }
                    .scope_boxed()
                })
                .await
                .map_err(|err| map_write_error(err, fields.inventory_code.as_ref()))?;

            Ok(RecordId::new(id))
        })
        .await
    }

    async fn apply_update(
        &self,
        changeset: &RecordChangeset,
    ) -> Result<ChangesetResult, CatalogRepositoryError> {
        self.bounded(async {
            let fields = &changeset.fields;
            let record_id = changeset.id.get();
            let expected = to_db_int(changeset.expected_version.get(), "version")?;
            let next = to_db_int(changeset.expected_version.next().get(), "version")?;
            let update = CatalogRecordUpdate {
                inventory_code: fields.inventory_code.as_ref().map(InventoryCode::as_str),
                name: &fields.name,
                description: &fields.description,
                category: &fields.category,
                manufacturer: &fields.manufacturer,
                manufactured_on: &fields.manufactured_on,
                condition: &fields.condition,
                origin: &fields.origin,
                attributes: serialise_attributes(fields)?,
                primary_asset: changeset.primary_asset.as_ref().map(AssetPath::as_str),
                version: next,
                updated_at: Some(changeset.updated_at),
            };
            let new_primary = changeset.primary_asset.as_ref().map(AssetPath::as_str);
            let links = positioned_links(fields)?;
            let retained = &changeset.retained_assets;
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;

            let outcome = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        // Lock the row at the expected version; no match means
                        // another writer moved it on or deleted it.
                        let locked: Option<Option<String>> = catalog_records::table
                            .filter(
                                catalog_records::id
                                    .eq(record_id)
                                    .and(catalog_records::version.eq(expected)),
                            )
                            .select(catalog_records::primary_asset)
                            .for_update()
                            .first(conn)
                            .await
                            .optional()?;
                        let Some(previous_primary) = locked else {
                            let current: Option<i32> = catalog_records::table
                                .find(record_id)
                                .select(catalog_records::version)
                                .first(conn)
                                .await
                                .optional()?;
                            return Ok(ChangesetRows::Mismatch { current });
                        };

                        let updated = diesel::update(catalog_records::table)
                            .filter(
                                catalog_records::id
                                    .eq(record_id)
                                    .and(catalog_records::version.eq(expected)),
                            )
                            .set(&update)
                            .execute(conn)
                            .await?;
                        if updated != 1 {
                            return Err(diesel::result::Error::RollbackTransaction);
                        }

                        diesel::delete(record_links::table.filter(record_links::record_id.eq(record_id)))
                            .execute(conn)
                            .await?;
                        insert_links(conn, record_id, &links).await?;

                        let existing: Vec<RecordAssetRow> = record_assets::table
                            .filter(record_assets::record_id.eq(record_id))
                            .select(RecordAssetRow::as_select())
                            .load(conn)
                            .await?;
                        let kept: Vec<_> = retained
                            .iter()
                            .filter(|keep| existing.iter().any(|row| row.id == keep.asset_id))
                            .collect();
                        let (dropped_ids, mut released): (Vec<i64>, Vec<String>) = existing
                            .into_iter()
                            .filter(|row| !kept.iter().any(|keep| keep.asset_id == row.id))
                            .map(|row| (row.id, row.path))
                            .unzip();
                        if !dropped_ids.is_empty() {
                            diesel::delete(record_assets::table.filter(record_assets::id.eq_any(dropped_ids)))
                                .execute(conn)
                                .await?;
                        }
                        for (position, keep) in (0_i32..).zip(kept.iter()) {
                            diesel::update(record_assets::table.find(keep.asset_id))
                                .set((
                                    record_assets::caption.eq(keep.caption.as_str()),
                                    record_assets::position.eq(position),
                                ))
                                .execute(conn)
                                .await?;
                        }
                        let new_assets = positioned_assets(&changeset.new_assets, kept.len())
                            .map_err(|_| diesel::result::Error::RollbackTransaction)?;
                        insert_assets(conn, record_id, &new_assets).await?;

                        if let Some(previous) = previous_primary {
                            if new_primary != Some(previous.as_str()) {
                                released.push(previous);
                            }
                        }
                        Ok(ChangesetRows::Applied {
                            version: next,
                            released,
                        })
                    }
                    .scope_boxed()
                })
                .await
                .map_err(|err| map_write_error(err, fields.inventory_code.as_ref()))?;

            match outcome {
                ChangesetRows::Mismatch { current } => Ok(ChangesetResult::VersionMismatch {
                    current: current
                        .map(|version| from_db_int(version, "version").map(RecordVersion::new))
                        .transpose()?,
                }),
                ChangesetRows::Applied { version, released } => Ok(ChangesetResult::Applied {
                    version: RecordVersion::new(from_db_int(version, "version")?),
                    released: released
                        .into_iter()
                        .filter_map(|path| match AssetPath::new(path) {
                            Ok(path) => Some(path),
                            Err(err) => {
                                warn!(error = %err, "skipping unusable released asset path");
                                None
                            }
                        })
                        .collect(),
                }),
            }
        })
        .await
    }

    async fn delete(&self, id: RecordId) -> Result<Option<Vec<AssetPath>>, CatalogRepositoryError> {
        self.bounded(async {
            let record_id = id.get();
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;

            let owned = conn
                .transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        let primary: Option<Option<String>> = catalog_records::table
                            .find(record_id)
                            .select(catalog_records::primary_asset)
                            .for_update()
                            .first(conn)
                            .await
                            .optional()?;
                        let Some(primary) = primary else {
                            return Ok(None);
                        };
                        let additional: Vec<String> = record_assets::table
                            .filter(record_assets::record_id.eq(record_id))
                            .order(record_assets::position.asc())
                            .select(record_assets::path)
                            .load(conn)
                            .await?;
                        diesel::delete(catalog_records::table.find(record_id))
                            .execute(conn)
                            .await?;
                        Ok(Some(primary.into_iter().chain(additional).collect::<Vec<_>>()))
                    }
                    .scope_boxed()
                })
                .await
                .map_err(map_diesel_error)?;

            owned
                .map(|paths| {
                    paths
                        .into_iter()
                        .map(|path| AssetPath::new(path).map_err(|err| corrupt("asset path", err)))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()
        })
        .await
    }

    async fn list_asset_references(&self) -> Result<Vec<AssetReference>, CatalogRepositoryError> {
        self.bounded(async {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            let primaries: Vec<(i64, Option<String>)> = catalog_records::table
                .filter(catalog_records::primary_asset.is_not_null())
                .select((catalog_records::id, catalog_records::primary_asset))
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;
            let additional: Vec<RecordAssetRow> = record_assets::table
                .select(RecordAssetRow::as_select())
                .load(&mut conn)
                .await
                .map_err(map_diesel_error)?;

            let primaries = primaries
                .into_iter()
                .filter_map(|(id, path)| path.map(|path| (id, path)))
                .map(|(id, path)| {
                    Ok(AssetReference {
                        record_id: RecordId::new(id),
                        path: AssetPath::new(path).map_err(|err| corrupt("asset path", err))?,
                        slot: AssetSlot::Primary,
                        position: 0,
                    })
                });
            let additional = additional.into_iter().map(|row| {
                Ok(AssetReference {
                    record_id: RecordId::new(row.record_id),
                    path: AssetPath::new(row.path).map_err(|err| corrupt("asset path", err))?,
                    slot: AssetSlot::Additional,
                    position: from_db_int(row.position, "asset position")?,
                })
            });
            primaries.chain(additional).collect()
        })
        .await
    }

    async fn is_asset_referenced(&self, file_name: &str) -> Result<bool, CatalogRepositoryError> {
        self.bounded(async {
            let pattern = format!("%/{}", escape_like(file_name));
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;

            let as_primary: bool = diesel::select(exists(
                catalog_records::table.filter(
                    catalog_records::primary_asset
                        .eq(file_name)
                        .or(catalog_records::primary_asset.like(&pattern).escape('\\')),
                ),
            ))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
            if as_primary {
                return Ok(true);
            }

            diesel::select(exists(
                record_assets::table.filter(
                    record_assets::path
                        .eq(file_name)
                        .or(record_assets::path.like(&pattern).escape('\\')),
                ),
            ))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn row() -> CatalogRecordRow {
        CatalogRecordRow {
            id: 12,
            inventory_code: Some("INV_IC2_0012".to_owned()),
            name: "Zenith Trans-Oceanic".to_owned(),
            description: String::new(),
            category: "Radios".to_owned(),
            manufacturer: "Zenith".to_owned(),
            manufactured_on: "1957".to_owned(),
            condition: "working".to_owned(),
            origin: "donation".to_owned(),
            attributes: serde_json::json!({
                "bands": { "value": "9", "label": "Bands", "displayOrder": 1 }
            }),
            primary_asset: Some("database/uploads/a_front.jpg".to_owned()),
            version: 3,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[rstest]
    fn row_converts_with_ordered_children() {
        let links = vec![RecordLinkRow {
            url: "https://example.org/zenith".to_owned(),
            position: 0,
        }];
        let assets = vec![RecordAssetRow {
            id: 5,
            record_id: 12,
            path: "database/uploads/b_back.jpg".to_owned(),
            caption: "back".to_owned(),
            position: 0,
        }];

        let record = row_to_record(row(), links, assets).expect("valid row");
        assert_eq!(record.version, RecordVersion::new(3));
        assert_eq!(record.fields.links, vec!["https://example.org/zenith".to_owned()]);
        assert_eq!(record.additional_assets[0].path.file_name(), "b_back.jpg");
        assert_eq!(
            record.fields.attributes.get("bands").map(|a| a.value.as_str()),
            Some("9")
        );
    }

    #[rstest]
    fn negative_version_is_reported_as_corruption() {
        let mut bad = row();
        bad.version = -1;
        let error = row_to_record(bad, Vec::new(), Vec::new()).expect_err("corrupt");
        assert!(matches!(error, CatalogRepositoryError::Query { .. }));
    }

    #[rstest]
    #[case("a_b.png", "a\\_b.png")]
    #[case("100%.jpg", "100\\%.jpg")]
    #[case("plain.gif", "plain.gif")]
    fn like_patterns_are_escaped(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_like(input), expected);
    }

    #[rstest]
    fn pool_error_maps_to_connection_error() {
        let error = map_pool_error(PoolError::checkout("connection refused"));
        assert!(matches!(error, CatalogRepositoryError::Connection { .. }));
    }
}
