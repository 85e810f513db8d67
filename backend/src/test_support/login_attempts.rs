//! In-memory login attempt store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{LoginAttemptRepository, LoginAttemptRepositoryError};
use crate::domain::{LoginAttemptKey, LoginAttemptRecord, ThrottlePolicy};

/// Map-backed [`LoginAttemptRepository`] with the adapter's retention rule.
#[derive(Default)]
pub struct InMemoryLoginAttempts {
    rows: Mutex<HashMap<LoginAttemptKey, LoginAttemptRecord>>,
}

impl InMemoryLoginAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row directly, bypassing the throttle.
    pub fn insert(&self, record: LoginAttemptRecord) {
        self.rows().insert(record.key.clone(), record);
    }

    pub fn get(&self, key: &LoginAttemptKey) -> Option<LoginAttemptRecord> {
        self.rows().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<LoginAttemptKey, LoginAttemptRecord>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LoginAttemptRepository for InMemoryLoginAttempts {
    async fn find(
        &self,
        key: &LoginAttemptKey,
    ) -> Result<Option<LoginAttemptRecord>, LoginAttemptRepositoryError> {
        Ok(self.get(key))
    }

    async fn register_failure(
        &self,
        key: &LoginAttemptKey,
        now: DateTime<Utc>,
        policy: ThrottlePolicy,
    ) -> Result<LoginAttemptRecord, LoginAttemptRepositoryError> {
        let mut rows = self.rows();
        let existing = rows.get(key).cloned();
        let record = LoginAttemptRecord::register_failure(existing, key, now, &policy);
        rows.insert(key.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, key: &LoginAttemptKey) -> Result<bool, LoginAttemptRepositoryError> {
        Ok(self.rows().remove(key).is_some())
    }

    async fn delete_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, LoginAttemptRepositoryError> {
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|_, record| record.last_attempt >= cutoff || record.is_locked(now));
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }

    async fn list_all(&self) -> Result<Vec<LoginAttemptRecord>, LoginAttemptRepositoryError> {
        let mut records: Vec<_> = self.rows().values().cloned().collect();
        records.sort_by(|left, right| right.last_attempt.cmp(&left.last_attempt));
        Ok(records)
    }
}
