//! The versioned lists kept in both stores during the migration.

pub mod premium;
pub mod reserved;
pub mod revocation;

pub use premium::{Money, PremiumList, PremiumListMetadata};
pub use reserved::{ReservationType, ReservedList, ReservedListEntry, ReservedListMetadata};
pub use revocation::{RevocationListId, RevocationListMetadata, SignedMarkRevocationList};

/// StoreA shard tables
pub const RESERVED_LIST_SHARDS: &str = "reserved_list_shards";
pub const PREMIUM_LIST_SHARDS: &str = "premium_list_shards";
pub const REVOCATION_LIST_SHARDS: &str = "smd_revocation_shards";

/// StoreB revision tables
pub const RESERVED_LIST_REVISIONS: &str = "reserved_list_revisions";
pub const PREMIUM_LIST_REVISIONS: &str = "premium_list_revisions";
pub const REVOCATION_LIST_REVISIONS: &str = "smd_revocation_revisions";
