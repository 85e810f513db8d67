//! Login attempt keys and the per-key lockout state machine.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::ThrottlePolicy;

/// Validation errors for [`LoginAttemptKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAttemptKeyValidationError {
    /// The identity (user name) was blank.
    EmptyIdentity,
    /// The origin (network address) was blank.
    EmptyOrigin,
}

impl fmt::Display for LoginAttemptKeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyIdentity => write!(f, "login identity must not be empty"),
            Self::EmptyOrigin => write!(f, "login origin must not be empty"),
        }
    }
}

impl std::error::Error for LoginAttemptKeyValidationError {}

/// `(identity, origin)` pair that failed attempts are counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptKey {
    identity: String,
    origin: String,
}

impl LoginAttemptKey {
    /// Validate and construct a key.
    ///
    /// # Examples
    /// ```
    /// use inventory::domain::LoginAttemptKey;
    ///
    /// let key = LoginAttemptKey::new("curator", "192.0.2.10").expect("valid key");
    /// assert_eq!(key.identity(), "curator");
    /// assert!(LoginAttemptKey::new("curator", " ").is_err());
    /// ```
    pub fn new(
        identity: impl Into<String>,
        origin: impl Into<String>,
    ) -> Result<Self, LoginAttemptKeyValidationError> {
        let identity = identity.into();
        let origin = origin.into();
        if identity.trim().is_empty() {
            return Err(LoginAttemptKeyValidationError::EmptyIdentity);
        }
        if origin.trim().is_empty() {
            return Err(LoginAttemptKeyValidationError::EmptyOrigin);
        }
        Ok(Self { identity, origin })
    }

    /// User name the attempts were made for.
    pub fn identity(&self) -> &str {
        self.identity.as_str()
    }

    /// Caller-supplied network address.
    pub fn origin(&self) -> &str {
        self.origin.as_str()
    }
}

impl fmt::Display for LoginAttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.origin)
    }
}

/// Stored failure counter for one key.
///
/// ## Invariants
/// - `attempts >= policy.max_attempts()` implies `locked_until` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptRecord {
    pub key: LoginAttemptKey,
    pub attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_attempt: DateTime<Utc>,
}

impl LoginAttemptRecord {
    /// True while `locked_until` lies in the future.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// True once a lock was set and has since elapsed.
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until <= now)
    }

    /// Whole minutes left on an active lock, rounded down; zero when unlocked.
    pub fn remaining_lock_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.locked_until {
            Some(until) if until > now => (until - now).num_minutes(),
            _ => 0,
        }
    }

    /// Apply one failed attempt.
    ///
    /// An elapsed lock resets the counter to one before counting; otherwise
    /// the counter grows by one. Reaching the policy maximum sets a fresh lock
    /// starting at `now`.
    pub fn register_failure(
        existing: Option<Self>,
        key: &LoginAttemptKey,
        now: DateTime<Utc>,
        policy: &ThrottlePolicy,
    ) -> Self {
        let mut record = match existing {
            Some(record) if record.lock_expired(now) => Self {
                attempts: 1,
                locked_until: None,
                last_attempt: now,
                ..record
            },
            Some(record) => Self {
                attempts: record.attempts.saturating_add(1),
                last_attempt: now,
                ..record
            },
            None => Self {
                key: key.clone(),
                attempts: 1,
                locked_until: None,
                last_attempt: now,
            },
        };

        if record.attempts >= policy.max_attempts() {
            record.locked_until = Some(now + lockout_delta(policy));
        }
        record
    }
}

fn lockout_delta(policy: &ThrottlePolicy) -> TimeDelta {
    TimeDelta::minutes(i64::from(policy.lockout_minutes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[fixture]
    fn key() -> LoginAttemptKey {
        LoginAttemptKey::new("curator", "198.51.100.4").expect("valid key")
    }

    #[rstest]
    fn first_failure_starts_counter(key: LoginAttemptKey, now: DateTime<Utc>) {
        let record = LoginAttemptRecord::register_failure(None, &key, now, &ThrottlePolicy::default());
        assert_eq!(record.attempts, 1);
        assert!(record.locked_until.is_none());
        assert_eq!(record.last_attempt, now);
    }

    #[rstest]
    fn reaching_maximum_sets_lock(key: LoginAttemptKey, now: DateTime<Utc>) {
        let policy = ThrottlePolicy::default();
        let record = (0..5).fold(None, |current, _| {
            Some(LoginAttemptRecord::register_failure(current, &key, now, &policy))
        });
        let record = record.expect("record exists");
        assert_eq!(record.attempts, 5);
        assert_eq!(record.locked_until, Some(now + TimeDelta::minutes(15)));
        assert!(record.is_locked(now));
        assert_eq!(record.remaining_lock_minutes(now + TimeDelta::seconds(30)), 14);
    }

    #[rstest]
    fn elapsed_lock_resets_counter(key: LoginAttemptKey, now: DateTime<Utc>) {
        let expired = LoginAttemptRecord {
            key: key.clone(),
            attempts: 5,
            locked_until: Some(now - TimeDelta::minutes(1)),
            last_attempt: now - TimeDelta::minutes(16),
        };
        assert!(expired.lock_expired(now));

        let record =
            LoginAttemptRecord::register_failure(Some(expired), &key, now, &ThrottlePolicy::default());
        assert_eq!(record.attempts, 1);
        assert!(record.locked_until.is_none());
    }

    #[rstest]
    #[case("", "203.0.113.1", LoginAttemptKeyValidationError::EmptyIdentity)]
    #[case("curator", "  ", LoginAttemptKeyValidationError::EmptyOrigin)]
    fn key_rejects_blank_parts(
        #[case] identity: &str,
        #[case] origin: &str,
        #[case] expected: LoginAttemptKeyValidationError,
    ) {
        assert_eq!(LoginAttemptKey::new(identity, origin), Err(expected));
    }
}
