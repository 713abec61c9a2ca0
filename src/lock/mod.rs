// ============================================================================
// Resource Locks
// ============================================================================
//
// Lease-based mutual exclusion for batch jobs. A lock row lives in StoreB
// under `{resource}/{scope}`; an expired row is as good as no row.
//
// ============================================================================

use crate::core::time::serde_instant;
use crate::core::{MigrationError, Result, format_instant};
use crate::sharded::record_prefix;
use crate::storage::StorageEngine;
use crate::storage::codec::{decode, get_typed, put_typed, read_once};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const LOCK_TABLE: &str = "locks";

const GLOBAL: &str = "GLOBAL";

/// Whether a lock covers the whole system or a single partition (TLD).
///
/// Stored as its key text, so a row naming an unusable partition fails to
/// decode instead of aliasing the global scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LockScope {
    Global,
    Partition(String),
}

impl LockScope {
    pub fn partition(label: &str) -> Result<Self> {
        let scope = LockScope::Partition(label.trim().to_string());
        scope.validate()?;
        Ok(scope)
    }

    /// Reject partitions that are empty, padded, contain `/`, or spell
    /// `GLOBAL` in any case. The variant is public, so every key built from a
    /// scope goes through here.
    pub fn validate(&self) -> Result<()> {
        match self {
            LockScope::Global => Ok(()),
            LockScope::Partition(label)
                if label.is_empty()
                    || label.trim() != label
                    || label.eq_ignore_ascii_case(GLOBAL)
                    || label.contains('/') =>
            {
                Err(MigrationError::InvalidArgument(format!(
                    "'{}' cannot be used as a lock partition",
                    label
                )))
            }
            LockScope::Partition(_) => Ok(()),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Global => f.write_str(GLOBAL),
            LockScope::Partition(label) => f.write_str(label),
        }
    }
}

impl FromStr for LockScope {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim() == GLOBAL {
            Ok(LockScope::Global)
        } else {
            LockScope::partition(s)
        }
    }
}

impl TryFrom<String> for LockScope {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LockScope> for String {
    fn from(scope: LockScope) -> String {
        scope.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub resource_name: String,
    pub scope: LockScope,
    pub owner_id: String,
    #[serde(with = "serde_instant")]
    pub acquired_time: DateTime<Utc>,
    #[serde(with = "serde_instant")]
    pub expiration_time: DateTime<Utc>,
}

impl Lock {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }

    fn held_error(&self) -> MigrationError {
        MigrationError::LockHeld {
            resource: self.resource_name.clone(),
            scope: self.scope.to_string(),
            owner: self.owner_id.clone(),
            expires: format_instant(self.expiration_time),
        }
    }

    fn not_held_error(&self) -> MigrationError {
        MigrationError::LockNotHeld {
            resource: self.resource_name.clone(),
            scope: self.scope.to_string(),
            owner: self.owner_id.clone(),
        }
    }
}

/// A fresh opaque owner id for callers without a request id of their own.
pub fn new_owner_id() -> String {
    Uuid::new_v4().to_string()
}

fn lock_key(resource_name: &str, scope: &LockScope) -> Result<String> {
    scope.validate()?;
    Ok(format!("{}{}", record_prefix(resource_name)?, scope))
}

/// Acquire/release operations over the lock table of one store.
#[derive(Clone)]
pub struct ResourceLock {
    engine: Arc<dyn StorageEngine>,
}

impl ResourceLock {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// Take the lock for `lease` starting at `now`.
    ///
    /// Fails with `LockHeld` while an unexpired row exists, including when a
    /// concurrent acquire commits first.
    pub async fn acquire(
        &self,
        resource_name: &str,
        scope: LockScope,
        owner_id: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lock> {
        if lease <= Duration::zero() {
            return Err(MigrationError::InvalidArgument(format!(
                "lock lease must be positive, got {}",
                lease
            )));
        }
        let key = lock_key(resource_name, &scope)?;
        let expiration_time = now
            .checked_add_signed(lease)
            .ok_or_else(|| {
                MigrationError::InvalidArgument(format!("lease {} overflows {}", lease, now))
            })?;

        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;
        if let Some(existing) = get_typed::<Lock>(engine, &mut txn, LOCK_TABLE, &key).await? {
            if !existing.is_expired_at(now) {
                engine.rollback(txn).await?;
                return Err(existing.held_error());
            }
            debug!(
                resource = %resource_name,
                %scope,
                previous_owner = %existing.owner_id,
                "replacing expired lock"
            );
        }

        let lock = Lock {
            resource_name: resource_name.to_string(),
            scope,
            owner_id: owner_id.to_string(),
            acquired_time: now,
            expiration_time,
        };
        put_typed(&mut txn, LOCK_TABLE, &key, &lock)?;

        match engine.commit(txn).await {
            Ok(()) => {}
            Err(MigrationError::TransactionConflict(reason)) => {
                return match read_once::<Lock>(engine, LOCK_TABLE, &key).await? {
                    Some(winner) => Err(winner.held_error()),
                    None => Err(MigrationError::TransactionConflict(reason)),
                };
            }
            Err(err) => return Err(err),
        }

        info!(
            resource = %lock.resource_name,
            scope = %lock.scope,
            owner = %lock.owner_id,
            expires = %format_instant(lock.expiration_time),
            "lock acquired"
        );
        Ok(lock)
    }

    /// Delete the lock row if it is still the one `lock` describes.
    pub async fn release(&self, lock: &Lock) -> Result<()> {
        let key = lock_key(&lock.resource_name, &lock.scope)?;
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;

        match get_typed::<Lock>(engine, &mut txn, LOCK_TABLE, &key).await? {
            Some(stored)
                if stored.owner_id == lock.owner_id && stored.acquired_time == lock.acquired_time =>
            {
                txn.delete(LOCK_TABLE, &key)?;
            }
            _ => {
                engine.rollback(txn).await?;
                return Err(lock.not_held_error());
            }
        }

        match engine.commit(txn).await {
            Ok(()) => {}
            Err(MigrationError::TransactionConflict(_)) => return Err(lock.not_held_error()),
            Err(err) => return Err(err),
        }

        info!(
            resource = %lock.resource_name,
            scope = %lock.scope,
            owner = %lock.owner_id,
            "lock released"
        );
        Ok(())
    }

    /// The stored row, expired or not.
    pub async fn load(&self, resource_name: &str, scope: &LockScope) -> Result<Option<Lock>> {
        let key = lock_key(resource_name, scope)?;
        read_once(self.engine.as_ref(), LOCK_TABLE, &key).await
    }

    /// Delete every row that has expired by `now`. Returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;
        let rows = engine.scan_prefix(&mut txn, LOCK_TABLE, "").await?;

        let mut removed = 0;
        for (key, bytes) in rows {
            let lock: Lock = decode(&bytes)?;
            if lock.is_expired_at(now) {
                txn.delete(LOCK_TABLE, &key)?;
                removed += 1;
            }
        }

        if removed == 0 {
            engine.rollback(txn).await?;
            return Ok(0);
        }
        engine.commit(txn).await?;
        info!(removed, "expired locks swept");
        Ok(removed)
    }
}
