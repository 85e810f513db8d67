//! Throttle service driving the per-key lockout state machine.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Serialize;
use tracing::{info, warn};

use super::{LoginAttemptKey, ThrottlePolicy};
use crate::domain::Error;
use crate::domain::ports::{LoginAttemptRepository, LoginAttemptRepositoryError};

/// Answer to "may this key try to authenticate now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed,
    Denied {
        remaining_minutes: i64,
        message: String,
    },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Operator-facing explanation for a denial.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { message, .. } => Some(message.as_str()),
        }
    }
}

/// Result of recording one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Still below the limit.
    Counting {
        attempts: u32,
        remaining_attempts: u32,
        message: String,
    },
    /// This failure reached the limit and locked the key.
    Locked {
        locked_until: DateTime<Utc>,
        message: String,
    },
}

impl FailureOutcome {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Counting { message, .. } | Self::Locked { message, .. } => message.as_str(),
        }
    }
}

/// One row of [`LoginThrottle::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptStatus {
    pub identity: String,
    pub origin: String,
    pub attempts: u32,
    pub is_locked: bool,
    pub remaining_minutes: i64,
    pub last_attempt: DateTime<Utc>,
}

/// Bounds authentication attempts per `(identity, origin)` key.
///
/// Failures are counted by the repository in one atomic step per key, so
/// concurrent attempts against the same key each consume one try.
#[derive(Clone)]
pub struct LoginThrottle<R> {
    repository: Arc<R>,
    policy: ThrottlePolicy,
    clock: Arc<dyn Clock>,
}

impl<R> LoginThrottle<R> {
    pub fn new(repository: Arc<R>, policy: ThrottlePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }
}

impl<R> LoginThrottle<R>
where
    R: LoginAttemptRepository,
{
    /// Decide whether `key` may attempt to authenticate. Never writes.
    pub async fn check_allowed(&self, key: &LoginAttemptKey) -> Result<AccessDecision, Error> {
        let now = self.clock.utc();
        let Some(record) = self.repository.find(key).await.map_err(map_attempt_error)? else {
            return Ok(AccessDecision::Allowed);
        };
        if !record.is_locked(now) {
            return Ok(AccessDecision::Allowed);
        }

        let remaining_minutes = record.remaining_lock_minutes(now);
        let message =
            format!("Account temporarily locked. Try again in {remaining_minutes} minutes.");
        warn!(key = %key, remaining_minutes, "login attempt refused while locked");
        Ok(AccessDecision::Denied {
            remaining_minutes,
            message,
        })
    }

    /// Count one failed attempt, locking the key when the limit is reached.
    pub async fn record_failure(&self, key: &LoginAttemptKey) -> Result<FailureOutcome, Error> {
        let now = self.clock.utc();
        let record = self
            .repository
            .register_failure(key, now, self.policy)
            .await
            .map_err(map_attempt_error)?;

        info!(key = %key, attempts = record.attempts, "failed login attempt recorded");
        match record.locked_until {
            Some(locked_until) => {
                warn!(key = %key, until = %locked_until, "login key locked");
                Ok(FailureOutcome::Locked {
                    locked_until,
                    message: format!(
                        "Too many failed login attempts. Account locked for {} minutes.",
                        self.policy.lockout_minutes()
                    ),
                })
            }
            None => {
                let remaining_attempts = self.policy.max_attempts().saturating_sub(record.attempts);
                Ok(FailureOutcome::Counting {
                    attempts: record.attempts,
                    remaining_attempts,
                    message: format!(
                        "Incorrect password. {remaining_attempts} attempt(s) remaining."
                    ),
                })
            }
        }
    }

    /// Forget every recorded failure for `key`. Returns whether any existed.
    pub async fn record_success(&self, key: &LoginAttemptKey) -> Result<bool, Error> {
        let cleared = self
            .repository
            .delete(key)
            .await
            .map_err(map_attempt_error)?;
        if cleared {
            info!(key = %key, "login attempts reset after success");
        }
        Ok(cleared)
    }

    /// Remove unlocked keys whose last event is older than `retention_days`.
    ///
    /// Locked keys survive regardless of age. Running this repeatedly is
    /// harmless.
    pub async fn prune(&self, retention_days: u32) -> Result<u64, Error> {
        let now = self.clock.utc();
        // Retention reaching past the representable range keeps everything.
        let cutoff = TimeDelta::try_days(i64::from(retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self
            .repository
            .delete_stale(cutoff, now)
            .await
            .map_err(map_attempt_error)?;
        info!(removed, retention_days, "stale login attempts pruned");
        Ok(removed)
    }

    /// Every known key with its lock state computed at the current time,
    /// most recent first.
    pub async fn status(&self) -> Result<Vec<AttemptStatus>, Error> {
        let now = self.clock.utc();
        let records = self
            .repository
            .list_all()
            .await
            .map_err(map_attempt_error)?;
        Ok(records
            .into_iter()
            .map(|record| AttemptStatus {
                identity: record.key.identity().to_owned(),
                origin: record.key.origin().to_owned(),
                attempts: record.attempts,
                is_locked: record.is_locked(now),
                remaining_minutes: record.remaining_lock_minutes(now),
                last_attempt: record.last_attempt,
            })
            .collect())
    }
}

fn map_attempt_error(error: LoginAttemptRepositoryError) -> Error {
    match error {
        LoginAttemptRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("login attempt store unavailable: {message}"))
        }
        LoginAttemptRepositoryError::Query { message } => {
            Error::internal(format!("login attempt store error: {message}"))
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
