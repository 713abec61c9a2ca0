// ============================================================================
// Dual-Store Data Access
// ============================================================================
//
// DualStoreDao routes each call to the scheduled primary store and shadows it
// to the secondary. Store-specific layouts live behind the StoreDao trait:
// sharded maps in StoreA and revision rows in StoreB.
//
// ============================================================================

pub mod diff;
pub mod dual;
pub mod entity;
pub mod store;

pub use diff::MapDifference;
pub use dual::{
    ComparisonReport, DualStoreDao, Finding, Loaded, ShadowWrite, Verification, VerificationMode,
};
pub use entity::{DualStoreEntity, ReportStyle, RevisionedEntity, ShardedEntity, StoreDao};
pub use store::{RevisionStoreDao, ShardedStoreDao};
