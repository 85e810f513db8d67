//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. They exist solely to satisfy Diesel's
//! type requirements for queries and mutations.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{catalog_records, login_attempts, record_assets, record_links};

// ---------------------------------------------------------------------------
// Catalog record models
// ---------------------------------------------------------------------------

/// Row struct for reading from the catalog_records table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = catalog_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CatalogRecordRow {
    pub id: i64,
    pub inventory_code: Option<String>,
    pub name: String,
    pub description: String,
    pub category: String,
    pub manufacturer: String,
    pub manufactured_on: String,
    pub condition: String,
    pub origin: String,
    pub attributes: serde_json::Value,
    pub primary_asset: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insertable struct for creating catalog records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = catalog_records)]
pub(crate) struct NewCatalogRecordRow<'a> {
    pub inventory_code: Option<&'a str>,
    pub name: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub manufacturer: &'a str,
    pub manufactured_on: &'a str,
    pub condition: &'a str,
    pub origin: &'a str,
    pub attributes: serde_json::Value,
    pub primary_asset: Option<&'a str>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// Changeset written by a version-guarded update.
///
/// `None` clears nullable columns rather than leaving them untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = catalog_records)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct CatalogRecordUpdate<'a> {
    pub inventory_code: Option<&'a str>,
    pub name: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub manufacturer: &'a str,
    pub manufactured_on: &'a str,
    pub condition: &'a str,
    pub origin: &'a str,
    pub attributes: serde_json::Value,
    pub primary_asset: Option<&'a str>,
    pub version: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Child row models
// ---------------------------------------------------------------------------

/// Row struct for reading from the record_assets table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = record_assets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RecordAssetRow {
    pub id: i64,
    pub record_id: i64,
    pub path: String,
    pub caption: String,
    pub position: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = record_assets)]
pub(crate) struct NewRecordAssetRow<'a> {
    pub record_id: i64,
    pub path: &'a str,
    pub caption: &'a str,
    pub position: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = record_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RecordLinkRow {
    pub url: String,
    pub position: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = record_links)]
pub(crate) struct NewRecordLinkRow<'a> {
    pub record_id: i64,
    pub url: &'a str,
    pub position: i32,
}

// ---------------------------------------------------------------------------
// Login attempt models
// ---------------------------------------------------------------------------

/// Row struct for reading from the login_attempts table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = login_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LoginAttemptRow {
    pub identity: String,
    pub origin: String,
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_attempt: DateTime<Utc>,
}

/// Zero-count row claimed before a failure is counted.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = login_attempts)]
pub(crate) struct NewLoginAttemptRow<'a> {
    pub identity: &'a str,
    pub origin: &'a str,
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_attempt: DateTime<Utc>,
}
