//! Login attempt throttling.
//!
//! Failed attempts are counted per `(identity, origin)` key. Reaching the
//! policy maximum locks the key for a fixed period; the first failure after
//! the lock elapses starts a fresh count, and a success clears the key.

mod attempt;
mod policy;
mod service;

pub use attempt::{LoginAttemptKey, LoginAttemptKeyValidationError, LoginAttemptRecord};
pub use policy::{LOCKOUT_MINUTES, MAX_LOGIN_ATTEMPTS, RETENTION_DAYS, ThrottlePolicy};
pub use service::{AccessDecision, AttemptStatus, FailureOutcome, LoginThrottle};
