//! Port for login attempt counters.
//!
//! The [`LoginAttemptRepository`] trait stores one row per
//! `(identity, origin)` key. Counting a failure is a read-modify-write, so the
//! port exposes it as one atomic operation: adapters apply
//! [`LoginAttemptRecord::register_failure`] while holding the row, and
//! concurrent failures for one key are serialised rather than lost.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LoginAttemptKey, LoginAttemptRecord, ThrottlePolicy};

use super::define_port_error;

define_port_error! {
    /// Errors raised by login attempt repository adapters.
    pub enum LoginAttemptRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "login attempt repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "login attempt repository query failed: {message}",
    }
}

/// Port for login attempt storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    /// Fetch the counter for a key, if any failure was recorded.
    async fn find(
        &self,
        key: &LoginAttemptKey,
    ) -> Result<Option<LoginAttemptRecord>, LoginAttemptRepositoryError>;

    /// Count one failure for `key` at `now` and return the stored result.
    ///
    /// The read, the transition and the write happen atomically per key.
    async fn register_failure(
        &self,
        key: &LoginAttemptKey,
        now: DateTime<Utc>,
        policy: ThrottlePolicy,
    ) -> Result<LoginAttemptRecord, LoginAttemptRepositoryError>;

    /// Remove the counter for a key. Returns whether a row existed.
    async fn delete(&self, key: &LoginAttemptKey) -> Result<bool, LoginAttemptRepositoryError>;

    /// Remove counters whose last event precedes `cutoff` and that are not
    /// locked at `now`.
    ///
    /// Returns the number of rows removed.
    async fn delete_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, LoginAttemptRepositoryError>;

    /// Every stored counter, most recent event first.
    async fn list_all(&self) -> Result<Vec<LoginAttemptRecord>, LoginAttemptRepositoryError>;
}
