//! Numeric lockout policy.

use std::time::Duration;

/// Failed attempts allowed before a key is locked.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;
/// Minutes a key stays locked once the limit is reached.
pub const LOCKOUT_MINUTES: u32 = 15;
/// Days an unlocked attempt record is retained after its last event.
pub const RETENTION_DAYS: u32 = 30;

/// Lockout policy applied by [`super::LoginThrottle`].
///
/// # Example
///
/// ```
/// # use inventory::domain::ThrottlePolicy;
/// # use std::time::Duration;
/// let policy = ThrottlePolicy::default();
/// assert_eq!(policy.max_attempts(), 5);
/// assert_eq!(policy.lockout(), Duration::from_secs(15 * 60));
/// assert_eq!(policy.retention_days(), 30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    max_attempts: u32,
    lockout_minutes: u32,
    retention_days: u32,
}

impl ThrottlePolicy {
    /// Build a policy, clamping every value to at least one.
    pub fn new(max_attempts: u32, lockout_minutes: u32, retention_days: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_minutes: lockout_minutes.max(1),
            retention_days: retention_days.max(1),
        }
    }

    /// Failed attempts allowed before locking.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Lock duration in whole minutes.
    pub fn lockout_minutes(&self) -> u32 {
        self.lockout_minutes
    }

    /// Lock duration.
    pub fn lockout(&self) -> Duration {
        Duration::from_secs(u64::from(self.lockout_minutes) * 60)
    }

    /// Default retention window used by pruning.
    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS, LOCKOUT_MINUTES, RETENTION_DAYS)
    }
}
