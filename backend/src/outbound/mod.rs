//! Outbound adapters implementing the domain ports.
//!
//! - **persistence**: catalog records and login attempts in PostgreSQL via
//!   Diesel.
//! - **assets**: uploaded blobs in a capability-scoped local directory.
//!
//! Adapters translate between domain types and storage representations and
//! hold no business rules.

pub mod assets;
pub mod persistence;
