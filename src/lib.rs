// ============================================================================
// regshift Library
// ============================================================================
//
// Migration-consistency core for moving a registry backend from one store to
// another while both stay live: time-versioned primary-store schedules,
// dual-store reads and writes with verification, sharded map persistence and
// lease-based resource locks.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod dao;
pub mod facade;
pub mod lists;
pub mod lock;
pub mod prelude;
pub mod property;
pub mod schedule;
pub mod sharded;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use config::MigrationConfig;
pub use core::{
    Clock, END_OF_TIME, FakeClock, MigrationError, PrimaryStore, Result, START_OF_TIME, SystemClock,
};
pub use dao::{
    ComparisonReport, DualStoreDao, DualStoreEntity, Loaded, MapDifference, ReportStyle,
    ShadowWrite, StoreDao, Verification, VerificationMode,
};
pub use facade::MigrationRegistry;
pub use lists::{
    Money, PremiumList, ReservationType, ReservedList, ReservedListEntry, SignedMarkRevocationList,
};
pub use lock::{Lock, LockScope, ResourceLock};
pub use property::{TimeVersionedProperty, TimeVersionedPropertyBuilder};
pub use schedule::{
    ScheduleCache, ScheduleCommands, ScheduleRepository, TransitionId, TransitionSchedule,
};
pub use sharded::ShardedMapEntity;
pub use storage::{InMemoryStore, SnapshotManager, StorageEngine};
