use crate::core::{MigrationError, PrimaryStore, Result};
use crate::dao::VerificationMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Migration runtime configuration
///
/// Loaded from JSON by the operator tool; every field is optional in the file
/// and falls back to [`MigrationConfig::default`]. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// How long a loaded transition schedule is served from cache
    #[serde(with = "duration_secs")]
    pub schedule_cache_ttl: Duration,

    /// Maximum number of cached schedules
    pub schedule_cache_capacity: usize,

    /// Drop the cached schedule after an operator writes it
    pub invalidate_cache_on_write: bool,

    /// Primary store for subsystems without a schedule
    pub default_primary: PrimaryStore,

    /// Store holding the transition schedules themselves
    pub schedule_store: PrimaryStore,

    /// Maximum entries per StoreA shard
    pub shard_size: usize,

    /// Differing keys listed individually before a diff collapses to a count
    pub diff_report_limit: usize,

    /// Handling of shadow-write failures
    pub verification_mode: VerificationMode,

    /// Return the primary value when secondary verification fails
    pub production_override: bool,

    /// Lease used when the caller does not pick one
    #[serde(with = "duration_secs")]
    pub default_lock_lease: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            schedule_cache_ttl: Duration::from_secs(300),
            schedule_cache_capacity: 16,
            invalidate_cache_on_write: true,
            default_primary: PrimaryStore::StoreA,
            schedule_store: PrimaryStore::StoreA,
            shard_size: 10_000,
            diff_report_limit: 10,
            verification_mode: VerificationMode::BestEffort,
            production_override: false,
            default_lock_lease: Duration::from_secs(30),
        }
    }
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set schedule cache TTL; zero disables caching
    pub fn schedule_cache_ttl(mut self, ttl: Duration) -> Self {
        self.schedule_cache_ttl = ttl;
        self
    }

    pub fn schedule_cache_capacity(mut self, capacity: usize) -> Self {
        self.schedule_cache_capacity = capacity;
        self
    }

    pub fn invalidate_cache_on_write(mut self, enabled: bool) -> Self {
        self.invalidate_cache_on_write = enabled;
        self
    }

    pub fn default_primary(mut self, store: PrimaryStore) -> Self {
        self.default_primary = store;
        self
    }

    pub fn schedule_store(mut self, store: PrimaryStore) -> Self {
        self.schedule_store = store;
        self
    }

    pub fn shard_size(mut self, size: usize) -> Self {
        self.shard_size = size;
        self
    }

    pub fn diff_report_limit(mut self, limit: usize) -> Self {
        self.diff_report_limit = limit;
        self
    }

    pub fn verification_mode(mut self, mode: VerificationMode) -> Self {
        self.verification_mode = mode;
        self
    }

    pub fn production_override(mut self, enabled: bool) -> Self {
        self.production_override = enabled;
        self
    }

    pub fn default_lock_lease(mut self, lease: Duration) -> Self {
        self.default_lock_lease = lease;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MigrationError::InvalidArgument(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.schedule_cache_capacity == 0 {
            return Err(MigrationError::InvalidArgument(
                "schedule_cache_capacity must be > 0".into(),
            ));
        }

        if self.shard_size == 0 {
            return Err(MigrationError::InvalidArgument("shard_size must be > 0".into()));
        }

        if self.default_lock_lease.is_zero() {
            return Err(MigrationError::InvalidArgument(
                "default_lock_lease must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Lock lease as a chrono duration
    pub fn lock_lease(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.default_lock_lease).map_err(|e| {
            MigrationError::InvalidArgument(format!("default_lock_lease out of range: {}", e))
        })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert_eq!(config.diff_report_limit, 10);
        assert_eq!(config.schedule_store, PrimaryStore::StoreA);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MigrationConfig::new()
            .schedule_cache_ttl(Duration::ZERO)
            .shard_size(2)
            .verification_mode(VerificationMode::Strict)
            .production_override(true);

        assert_eq!(config.schedule_cache_ttl, Duration::ZERO);
        assert_eq!(config.shard_size, 2);
        assert_eq!(config.verification_mode, VerificationMode::Strict);
        assert!(config.production_override);
    }

    #[test]
    fn test_partial_json() {
        let config = MigrationConfig::from_json_str(
            r#"{
                "schedule_cache_ttl": 0,
                "default_primary": "STORE_B",
                "verification_mode": "strict"
            }"#,
        )
        .unwrap();
        assert_eq!(config.schedule_cache_ttl, Duration::ZERO);
        assert_eq!(config.default_primary, PrimaryStore::StoreB);
        assert_eq!(config.verification_mode, VerificationMode::Strict);
        assert_eq!(config.shard_size, 10_000);
    }

    #[test]
    fn test_validation() {
        assert!(MigrationConfig::new().shard_size(0).validate().is_err());
        assert!(MigrationConfig::new().schedule_cache_capacity(0).validate().is_err());
        assert!(MigrationConfig::new().default_lock_lease(Duration::ZERO).validate().is_err());
        assert!(MigrationConfig::from_json_str(r#"{ "shard_size": 0 }"#).is_err());
        assert!(MigrationConfig::from_json_str("not json").is_err());
    }
}
