// ============================================================================
// Sharded Maps
// ============================================================================
//
// Large maps are split into bounded records that share a ShardGroup. The
// partition and merge steps are pure; ShardedMapEntity adds the store I/O.
//
// ============================================================================

pub mod entity;
pub mod shard;

pub use entity::{ShardedMapEntity, record_prefix};
pub use shard::{MapShard, ShardGroup, ShardedMap, merge_shards, partition_map};
