//! Operator settings loaded via OrthoConfig.
//!
//! Every value can come from the command line, an `INVENTORY_*` environment
//! variable or a configuration file; unset values fall back to the defaults
//! below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{
    CodeFormat, DEFAULT_ALLOWED_EXTENSIONS, InventoryCodeValidationError, LOCKOUT_MINUTES,
    MAX_LOGIN_ATTEMPTS, RETENTION_DAYS, ThrottlePolicy,
};
use crate::outbound::persistence::PoolConfig;

const DEFAULT_ASSET_DIR: &str = "database/uploads";
const DEFAULT_POOL_MAX_SIZE: u32 = 10;
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Settings that cannot be turned into working components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// No `INVENTORY_DATABASE_URL` was supplied.
    #[error("database_url is not configured (set INVENTORY_DATABASE_URL)")]
    MissingDatabaseUrl,
    /// Prefix or width do not form a usable inventory code format.
    #[error("invalid inventory code format: {0}")]
    CodeFormat(#[from] InventoryCodeValidationError),
}

/// Configuration for the `inventory` operator binary and library wiring.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "INVENTORY")]
pub struct InventorySettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Directory holding uploaded assets.
    pub asset_dir: Option<PathBuf>,
    /// Inventory code prefix.
    pub code_prefix: Option<String>,
    /// Number of digits after the prefix.
    pub code_width: Option<usize>,
    /// Comma-separated extensions the collector treats as assets.
    pub allowed_extensions: Option<String>,
    /// Failures tolerated before a key is locked.
    pub max_login_attempts: Option<u32>,
    /// Lock duration in minutes.
    pub lockout_minutes: Option<u32>,
    /// Idle days after which unlocked attempt rows are pruned.
    pub retention_days: Option<u32>,
    /// Maximum pooled database connections.
    pub pool_max_size: Option<u32>,
    /// Seconds a store access may wait for a connection.
    pub connection_timeout_secs: Option<u64>,
    /// Seconds one store access may run once it holds a connection.
    pub query_timeout_secs: Option<u64>,
}

impl InventorySettings {
    /// Configured connection string.
    ///
    /// # Errors
    ///
    /// [`SettingsError::MissingDatabaseUrl`] when none was supplied.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    /// Asset directory, `database/uploads` by default.
    pub fn asset_dir(&self) -> &Path {
        self.asset_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_ASSET_DIR))
    }

    /// Inventory code format.
    ///
    /// # Errors
    ///
    /// [`SettingsError::CodeFormat`] for a blank prefix or unusable width.
    pub fn code_format(&self) -> Result<CodeFormat, SettingsError> {
        let prefix = self
            .code_prefix
            .clone()
            .unwrap_or_else(|| CodeFormat::DEFAULT_PREFIX.to_owned());
        let width = self.code_width.unwrap_or(CodeFormat::DEFAULT_WIDTH);
        Ok(CodeFormat::new(prefix, width)?)
    }

    /// Lower-cased extensions, without leading dots.
    pub fn allowed_extensions(&self) -> Vec<String> {
        match self.allowed_extensions.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            None => DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
        }
    }

    /// Lockout thresholds.
    pub fn throttle_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy::new(
            self.max_login_attempts.unwrap_or(MAX_LOGIN_ATTEMPTS),
            self.lockout_minutes.unwrap_or(LOCKOUT_MINUTES),
            self.retention_days.unwrap_or(RETENTION_DAYS),
        )
    }

    /// Pool settings for the configured database.
    ///
    /// # Errors
    ///
    /// [`SettingsError::MissingDatabaseUrl`] when no URL is configured.
    pub fn pool_config(&self) -> Result<PoolConfig, SettingsError> {
        let checkout = self
            .connection_timeout_secs
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS);
        let query = self.query_timeout_secs.unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);
        Ok(PoolConfig::new(self.database_url()?)
            .with_max_size(self.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE))
            .with_connection_timeout(Duration::from_secs(checkout))
            .with_query_timeout(Duration::from_secs(query)))
    }
}

#[cfg(test)]
mod tests {
    //! Environment-driven settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARIABLES: [&str; 11] = [
        "INVENTORY_DATABASE_URL",
        "INVENTORY_ASSET_DIR",
        "INVENTORY_CODE_PREFIX",
        "INVENTORY_CODE_WIDTH",
        "INVENTORY_ALLOWED_EXTENSIONS",
        "INVENTORY_MAX_LOGIN_ATTEMPTS",
        "INVENTORY_LOCKOUT_MINUTES",
        "INVENTORY_RETENTION_DAYS",
        "INVENTORY_POOL_MAX_SIZE",
        "INVENTORY_CONNECTION_TIMEOUT_SECS",
        "INVENTORY_QUERY_TIMEOUT_SECS",
    ];

    fn load_from_empty_args() -> InventorySettings {
        InventorySettings::load_from_iter([OsString::from("inventory")])
            .expect("config should load")
    }

    fn cleared() -> Vec<(&'static str, Option<String>)> {
        VARIABLES.iter().map(|name| (*name, None)).collect()
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let _guard = lock_env(cleared());

        let settings = load_from_empty_args();

        assert_eq!(settings.database_url(), Err(SettingsError::MissingDatabaseUrl));
        assert_eq!(settings.asset_dir(), Path::new("database/uploads"));
        let format = settings.code_format().expect("default format");
        assert_eq!(format.prefix(), "INV_IC2_");
        assert_eq!(format.width(), 4);
        assert_eq!(settings.allowed_extensions(), vec!["png", "jpg", "jpeg", "gif"]);
        let policy = settings.throttle_policy();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.lockout_minutes(), 15);
        assert_eq!(policy.retention_days(), 30);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let mut vars = cleared();
        for (name, value) in [
            ("INVENTORY_DATABASE_URL", "postgres://curator@db/inventory"),
            ("INVENTORY_ASSET_DIR", "/srv/uploads"),
            ("INVENTORY_CODE_PREFIX", "MUS_"),
            ("INVENTORY_CODE_WIDTH", "6"),
            ("INVENTORY_ALLOWED_EXTENSIONS", ".PNG, webp,"),
            ("INVENTORY_MAX_LOGIN_ATTEMPTS", "3"),
            ("INVENTORY_POOL_MAX_SIZE", "4"),
            ("INVENTORY_CONNECTION_TIMEOUT_SECS", "7"),
            ("INVENTORY_QUERY_TIMEOUT_SECS", "12"),
        ] {
            if let Some(slot) = vars.iter_mut().find(|(var, _)| *var == name) {
                slot.1 = Some(value.to_owned());
            }
        }
        let _guard = lock_env(vars);

        let settings = load_from_empty_args();

        assert_eq!(settings.database_url(), Ok("postgres://curator@db/inventory"));
        assert_eq!(settings.asset_dir(), Path::new("/srv/uploads"));
        let format = settings.code_format().expect("custom format");
        assert_eq!(format.prefix(), "MUS_");
        assert_eq!(format.width(), 6);
        assert_eq!(settings.allowed_extensions(), vec!["png", "webp"]);
        assert_eq!(settings.throttle_policy().max_attempts(), 3);
        let pool = settings.pool_config().expect("pool config");
        assert_eq!(pool.max_size(), 4);
        assert_eq!(pool.connection_timeout(), Duration::from_secs(7));
        assert_eq!(pool.query_timeout(), Duration::from_secs(12));
    }

    #[rstest]
    fn zero_width_is_rejected() {
        let mut vars = cleared();
        if let Some(slot) = vars.iter_mut().find(|(var, _)| *var == "INVENTORY_CODE_WIDTH") {
            slot.1 = Some("0".to_owned());
        }
        let _guard = lock_env(vars);

        let settings = load_from_empty_args();

        assert!(matches!(settings.code_format(), Err(SettingsError::CodeFormat(_))));
    }
}
