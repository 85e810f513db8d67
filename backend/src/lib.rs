//! Inventory catalog library: record consistency rules, asset collection and
//! login throttling over PostgreSQL and a local asset directory.

pub mod config;
pub mod domain;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
