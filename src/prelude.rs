//! Recommended imports grouped by abstraction level.
//!
//! `routing` covers what application code needs to read and write migrated
//! data. `advanced` exposes the store seams for wiring custom entities.

pub mod routing {
    //! Everyday surface: registry, schedules, lists and locks.
    pub use crate::{
        Clock, LockScope, Loaded, MigrationConfig, MigrationError, MigrationRegistry, Money,
        PremiumList, PrimaryStore, ReservationType, ReservedList, ReservedListEntry, Result,
        ShadowWrite, SignedMarkRevocationList, SystemClock, TransitionId, Verification,
    };
}

pub mod advanced {
    //! Store-level building blocks for entities beyond the built-in lists.
    pub use crate::dao::{RevisionStoreDao, RevisionedEntity, ShardedEntity, ShardedStoreDao};
    pub use crate::sharded::{ShardGroup, ShardedMap, merge_shards, partition_map};
    pub use crate::storage::codec;
    pub use crate::transaction::Transaction;
    pub use crate::{
        DualStoreDao, DualStoreEntity, InMemoryStore, ReportStyle, ShardedMapEntity, StorageEngine,
        StoreDao,
    };
}
