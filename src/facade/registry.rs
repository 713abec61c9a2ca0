use crate::config::MigrationConfig;
use crate::core::{Clock, PrimaryStore, Result, SystemClock};
use crate::dao::{
    ComparisonReport, DualStoreDao, DualStoreEntity, Loaded, RevisionStoreDao, ShadowWrite,
    ShardedStoreDao,
};
use crate::lists::{
    PREMIUM_LIST_REVISIONS, PREMIUM_LIST_SHARDS, PremiumList, RESERVED_LIST_REVISIONS,
    RESERVED_LIST_SHARDS, REVOCATION_LIST_REVISIONS, REVOCATION_LIST_SHARDS, ReservedList,
    RevocationListId, SignedMarkRevocationList,
};
use crate::lock::{Lock, LockScope, ResourceLock};
use crate::schedule::{ScheduleCache, ScheduleCommands, ScheduleRepository, TransitionId};
use crate::sharded::ShardedMapEntity;
use crate::storage::{InMemoryStore, StorageEngine};
use std::sync::Arc;

/// Both stores plus everything that routes between them.
///
/// Each list operation first asks the schedule cache which store is primary
/// for the list's subsystem right now, then goes through the dual-store DAO.
pub struct MigrationRegistry {
    store_a: Arc<dyn StorageEngine>,
    store_b: Arc<dyn StorageEngine>,
    config: MigrationConfig,
    clock: Arc<dyn Clock>,
    repository: ScheduleRepository,
    schedules: Arc<ScheduleCache>,
    reserved_lists: DualStoreDao<ReservedList>,
    premium_lists: DualStoreDao<PremiumList>,
    revocation_lists: DualStoreDao<SignedMarkRevocationList>,
    locks: ResourceLock,
}

impl MigrationRegistry {
    pub fn new(
        store_a: Arc<dyn StorageEngine>,
        store_b: Arc<dyn StorageEngine>,
        config: MigrationConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let schedule_engine = match config.schedule_store {
            PrimaryStore::StoreA => store_a.clone(),
            PrimaryStore::StoreB => store_b.clone(),
        };
        let repository = ScheduleRepository::new(schedule_engine);
        let schedules = Arc::new(ScheduleCache::new(
            repository.clone(),
            clock.clone(),
            config.schedule_cache_ttl,
            config.schedule_cache_capacity,
        )?);

        let reserved_lists: DualStoreDao<ReservedList> = DualStoreDao::new(
            Arc::new(ShardedStoreDao::<ReservedList>::new(
                store_a.clone(),
                ShardedMapEntity::new(RESERVED_LIST_SHARDS, config.shard_size)?,
            )),
            Arc::new(RevisionStoreDao::<ReservedList>::new(
                store_b.clone(),
                RESERVED_LIST_REVISIONS,
            )),
        );
        let premium_lists: DualStoreDao<PremiumList> = DualStoreDao::new(
            Arc::new(ShardedStoreDao::<PremiumList>::new(
                store_a.clone(),
                ShardedMapEntity::new(PREMIUM_LIST_SHARDS, config.shard_size)?,
            )),
            Arc::new(RevisionStoreDao::<PremiumList>::new(
                store_b.clone(),
                PREMIUM_LIST_REVISIONS,
            )),
        );
        let revocation_lists: DualStoreDao<SignedMarkRevocationList> = DualStoreDao::new(
            Arc::new(ShardedStoreDao::<SignedMarkRevocationList>::new(
                store_a.clone(),
                ShardedMapEntity::new(REVOCATION_LIST_SHARDS, config.shard_size)?,
            )),
            Arc::new(RevisionStoreDao::<SignedMarkRevocationList>::new(
                store_b.clone(),
                REVOCATION_LIST_REVISIONS,
            )),
        );

        Ok(Self {
            locks: ResourceLock::new(store_b.clone()),
            reserved_lists: Self::tune(reserved_lists, &config),
            premium_lists: Self::tune(premium_lists, &config),
            revocation_lists: Self::tune(revocation_lists, &config),
            store_a,
            store_b,
            config,
            clock,
            repository,
            schedules,
        })
    }

    /// Two fresh in-process stores on the system clock.
    pub fn in_memory(config: MigrationConfig) -> Result<Self> {
        Self::new(
            Arc::new(InMemoryStore::new("store_a")),
            Arc::new(InMemoryStore::new("store_b")),
            config,
            Arc::new(SystemClock),
        )
    }

    fn tune<T: DualStoreEntity>(
        dao: DualStoreDao<T>,
        config: &MigrationConfig,
    ) -> DualStoreDao<T> {
        dao.with_mode(config.verification_mode)
            .with_production_override(config.production_override)
            .with_diff_report_limit(config.diff_report_limit)
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self, store: PrimaryStore) -> &Arc<dyn StorageEngine> {
        match store {
            PrimaryStore::StoreA => &self.store_a,
            PrimaryStore::StoreB => &self.store_b,
        }
    }

    /// Primary store for `id` now, falling back to the configured default.
    pub async fn primary_store(&self, id: TransitionId) -> PrimaryStore {
        self.schedules.primary_store(id, self.config.default_primary).await
    }

    pub fn schedules(&self) -> &Arc<ScheduleCache> {
        &self.schedules
    }

    pub fn schedule_commands(&self) -> ScheduleCommands {
        let commands = ScheduleCommands::new(self.repository.clone(), self.config.default_primary);
        if self.config.invalidate_cache_on_write {
            commands.invalidating(self.schedules.clone())
        } else {
            commands
        }
    }

    pub fn reserved_lists(&self) -> &DualStoreDao<ReservedList> {
        &self.reserved_lists
    }

    pub fn premium_lists(&self) -> &DualStoreDao<PremiumList> {
        &self.premium_lists
    }

    pub fn revocation_lists(&self) -> &DualStoreDao<SignedMarkRevocationList> {
        &self.revocation_lists
    }

    pub async fn save_reserved_list(&self, list: &ReservedList) -> Result<ShadowWrite> {
        let primary = self.primary_store(TransitionId::DomainLabelLists).await;
        self.reserved_lists.save(primary, list).await
    }

    pub async fn latest_reserved_list(&self, name: &str) -> Result<Loaded<ReservedList>> {
        let primary = self.primary_store(TransitionId::DomainLabelLists).await;
        self.reserved_lists.load(primary, &name.to_string()).await
    }

    /// Premium lists migrate with the other domain label lists.
    pub async fn save_premium_list(&self, list: &PremiumList) -> Result<ShadowWrite> {
        let primary = self.primary_store(TransitionId::DomainLabelLists).await;
        self.premium_lists.save(primary, list).await
    }

    pub async fn latest_premium_list(&self, name: &str) -> Result<Loaded<PremiumList>> {
        let primary = self.primary_store(TransitionId::DomainLabelLists).await;
        self.premium_lists.load(primary, &name.to_string()).await
    }

    pub async fn save_revocation_list(
        &self,
        list: &SignedMarkRevocationList,
    ) -> Result<ShadowWrite> {
        let primary = self.primary_store(TransitionId::SignedMarkRevocationList).await;
        self.revocation_lists.save(primary, list).await
    }

    pub async fn load_revocation_list(&self) -> Result<Loaded<SignedMarkRevocationList>> {
        let primary = self.primary_store(TransitionId::SignedMarkRevocationList).await;
        self.revocation_lists.load(primary, &RevocationListId).await
    }

    pub async fn compare_reserved_lists(&self) -> Result<ComparisonReport> {
        self.reserved_lists.compare_all().await
    }

    pub async fn compare_premium_lists(&self) -> Result<ComparisonReport> {
        self.premium_lists.compare_all().await
    }

    pub async fn compare_revocation_lists(&self) -> Result<ComparisonReport> {
        self.revocation_lists.compare_all().await
    }

    pub fn locks(&self) -> &ResourceLock {
        &self.locks
    }

    /// Acquire with the configured lease at the clock's current time.
    pub async fn acquire_lock(
        &self,
        resource_name: &str,
        scope: LockScope,
        owner_id: &str,
    ) -> Result<Lock> {
        let lease = self.config.lock_lease()?;
        self.locks
            .acquire(resource_name, scope, owner_id, lease, self.clock.now())
            .await
    }
}
