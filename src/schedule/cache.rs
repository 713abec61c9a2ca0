use super::repository::ScheduleRepository;
use super::transition::{TransitionId, TransitionSchedule};
use crate::core::{Clock, MigrationError, PrimaryStore, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

struct CachedSchedule {
    schedule: Option<TransitionSchedule>,
    expires_at: DateTime<Utc>,
}

/// Short-lived, bounded cache in front of [`ScheduleRepository`].
///
/// Schedules are read on every routing decision and change rarely. Entries
/// expire after `ttl` on the injected clock; a zero TTL disables caching.
/// Absent schedules are cached too, so a subsystem that never migrated does
/// not hit the store on every call.
pub struct ScheduleCache {
    repository: ScheduleRepository,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    entries: Mutex<LruCache<TransitionId, CachedSchedule>>,
}

impl ScheduleCache {
    pub fn new(
        repository: ScheduleRepository,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        capacity: usize,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            MigrationError::InvalidArgument("schedule cache capacity must be > 0".into())
        })?;
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| {
            MigrationError::InvalidArgument(format!("schedule cache TTL out of range: {}", e))
        })?;

        Ok(Self {
            repository,
            clock,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Cached schedule lookup.
    ///
    /// A store error while refreshing is logged and reported as `None`;
    /// callers then fall back to their default store.
    pub async fn get(&self, id: TransitionId) -> Option<TransitionSchedule> {
        let now = self.clock.now();
        {
            let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(cached) = entries.get(&id)
                && now < cached.expires_at
            {
                return cached.schedule.clone();
            }
        }

        match self.repository.load(id).await {
            Ok(schedule) => {
                debug!(id = %id, found = schedule.is_some(), "transition schedule refreshed");
                if self.ttl > chrono::Duration::zero() {
                    let expires_at = now
                        .checked_add_signed(self.ttl)
                        .unwrap_or(crate::core::END_OF_TIME);
                    let mut entries = self
                        .entries
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    entries.put(
                        id,
                        CachedSchedule {
                            schedule: schedule.clone(),
                            expires_at,
                        },
                    );
                }
                schedule
            }
            Err(err) => {
                warn!(
                    id = %id,
                    error = %err,
                    store = self.repository.store_name(),
                    "failed to load transition schedule"
                );
                None
            }
        }
    }

    /// Primary store for `id` at the clock's current time, or `default` when no
    /// schedule is available.
    pub async fn primary_store(&self, id: TransitionId, default: PrimaryStore) -> PrimaryStore {
        match self.get(id).await {
            Some(schedule) => schedule.primary_store_at(self.clock.now()),
            None => default,
        }
    }

    pub fn invalidate(&self, id: TransitionId) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop(&id);
    }

    pub fn invalidate_all(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FakeClock;
    use crate::storage::InMemoryStore;

    fn setup(
        ttl: Duration,
    ) -> (Arc<InMemoryStore>, Arc<FakeClock>, ScheduleRepository, ScheduleCache) {
        let store = Arc::new(InMemoryStore::new("store_a"));
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let repository = ScheduleRepository::new(store.clone());
        let cache = ScheduleCache::new(repository.clone(), clock.clone(), ttl, 8).unwrap();
        (store, clock, repository, cache)
    }

    async fn switch_to_b(repository: &ScheduleRepository, at: DateTime<Utc>) {
        repository
            .append(TransitionId::DomainLabelLists, at, PrimaryStore::StoreB, PrimaryStore::StoreA)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cached_value_survives_writes_until_expiry() {
        let (_store, clock, repository, cache) = setup(Duration::from_secs(60));
        assert!(cache.get(TransitionId::DomainLabelLists).await.is_none());

        switch_to_b(&repository, clock.now() - chrono::Duration::days(1)).await;
        assert!(cache.get(TransitionId::DomainLabelLists).await.is_none());

        clock.advance_by(chrono::Duration::seconds(61));
        let schedule = cache.get(TransitionId::DomainLabelLists).await.unwrap();
        assert_eq!(schedule.primary_store_at(clock.now()), PrimaryStore::StoreB);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let (_store, clock, repository, cache) = setup(Duration::ZERO);
        assert!(cache.get(TransitionId::DomainLabelLists).await.is_none());

        switch_to_b(&repository, clock.now() - chrono::Duration::days(1)).await;
        assert_eq!(
            cache.primary_store(TransitionId::DomainLabelLists, PrimaryStore::StoreA).await,
            PrimaryStore::StoreB
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (_store, clock, repository, cache) = setup(Duration::from_secs(3600));
        assert!(cache.get(TransitionId::DomainLabelLists).await.is_none());

        switch_to_b(&repository, clock.now() - chrono::Duration::days(1)).await;
        cache.invalidate(TransitionId::DomainLabelLists);
        assert!(cache.get(TransitionId::DomainLabelLists).await.is_some());
    }

    #[tokio::test]
    async fn test_store_error_fails_softly_to_default() {
        let (store, _clock, _repository, cache) = setup(Duration::from_secs(60));
        store.set_available(false);

        assert!(cache.get(TransitionId::SignedMarkRevocationList).await.is_none());
        assert_eq!(
            cache
                .primary_store(TransitionId::SignedMarkRevocationList, PrimaryStore::StoreA)
                .await,
            PrimaryStore::StoreA
        );
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let repository = ScheduleRepository::new(Arc::new(InMemoryStore::new("a")));
        let clock = Arc::new(FakeClock::new(Utc::now()));
        assert!(ScheduleCache::new(repository, clock, Duration::from_secs(1), 0).is_err());
    }
}
