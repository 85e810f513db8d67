//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Adapters translate between Diesel rows and domain types and nothing more:
//! version checks run as SQL predicates, but deciding what a conflict means
//! stays in the domain services. Row structs (`models.rs`) and table
//! definitions (`schema.rs`) never leave this module.
//!
//! ```ignore
//! use inventory::outbound::persistence::{DbPool, DieselCatalogRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/inventory")).await?;
//! let repository = DieselCatalogRepository::new(pool);
//! ```

mod diesel_catalog_repository;
mod diesel_error_mapping;
mod diesel_login_attempt_repository;
mod models;
mod pool;
mod schema;

pub use diesel_catalog_repository::DieselCatalogRepository;
pub use diesel_login_attempt_repository::DieselLoginAttemptRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
