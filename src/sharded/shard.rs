//! Pure partition/merge functions for sharded maps.

use crate::core::time::serde_instant;
use crate::core::{MigrationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identity shared by every shard of one logical map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGroup {
    pub logical_id: String,
    #[serde(with = "serde_instant")]
    pub creation_time: DateTime<Utc>,
}

/// One stored fragment of a logical map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapShard<M, K: Ord, V> {
    pub group: ShardGroup,
    pub index: usize,
    pub shard_count: usize,
    pub metadata: M,
    pub entries: BTreeMap<K, V>,
}

/// A logical map reassembled from its shards.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardedMap<M, K: Ord, V> {
    pub group: ShardGroup,
    pub metadata: M,
    pub entries: BTreeMap<K, V>,
}

/// Split `map` into consecutive chunks of at most `limit` entries, in key order.
///
/// An empty map yields a single empty chunk.
pub fn partition_map<K, V>(map: &BTreeMap<K, V>, limit: usize) -> Result<Vec<BTreeMap<K, V>>>
where
    K: Ord + Clone,
    V: Clone,
{
    if limit == 0 {
        return Err(MigrationError::InvalidArgument(
            "shard size limit must be > 0".into(),
        ));
    }

    let mut shards = Vec::with_capacity(map.len().div_ceil(limit).max(1));
    let mut current = BTreeMap::new();
    for (key, value) in map {
        if current.len() == limit {
            shards.push(std::mem::take(&mut current));
        }
        current.insert(key.clone(), value.clone());
    }
    shards.push(current);
    Ok(shards)
}

/// Reassemble a logical map, rejecting any shard set that could not have been
/// written by a single save.
pub fn merge_shards<M, K, V>(shards: Vec<MapShard<M, K, V>>) -> Result<ShardedMap<M, K, V>>
where
    M: PartialEq,
    K: Ord + std::fmt::Display,
{
    let mut shards = shards.into_iter();
    let first = shards
        .next()
        .ok_or_else(|| MigrationError::InconsistentShards("no shards to merge".into()))?;

    let group = first.group;
    let metadata = first.metadata;
    let shard_count = first.shard_count;
    // Indices seen so far; shard_count is untrusted and never sizes an allocation
    let mut seen = BTreeSet::new();
    let mut entries = BTreeMap::new();

    let mut absorb = |index: usize, part: BTreeMap<K, V>| -> Result<()> {
        if index >= shard_count {
            return Err(MigrationError::InconsistentShards(format!(
                "shard index {} out of range for '{}' with {} shards",
                index, group.logical_id, shard_count
            )));
        }
        if !seen.insert(index) {
            return Err(MigrationError::InconsistentShards(format!(
                "duplicate shard index {} for '{}'",
                index, group.logical_id
            )));
        }
        for (key, value) in part {
            if entries.contains_key(&key) {
                return Err(MigrationError::InconsistentShards(format!(
                    "key {} appears in more than one shard of '{}'",
                    key, group.logical_id
                )));
            }
            entries.insert(key, value);
        }
        Ok(())
    };

    absorb(first.index, first.entries)?;
    for shard in shards {
        if shard.group.creation_time != group.creation_time {
            return Err(MigrationError::InconsistentShards(format!(
                "Inconsistent creation times: {} vs. {}",
                group.creation_time, shard.group.creation_time
            )));
        }
        if shard.group.logical_id != group.logical_id {
            return Err(MigrationError::InconsistentShards(format!(
                "shard of '{}' mixed into '{}'",
                shard.group.logical_id, group.logical_id
            )));
        }
        if shard.shard_count != shard_count {
            return Err(MigrationError::InconsistentShards(format!(
                "shard count {} disagrees with {} for '{}'",
                shard.shard_count, shard_count, group.logical_id
            )));
        }
        if shard.metadata != metadata {
            return Err(MigrationError::InconsistentShards(format!(
                "metadata differs between shards of '{}'",
                group.logical_id
            )));
        }
        absorb(shard.index, shard.entries)?;
    }

    if let Some(missing) = (0..shard_count).find(|index| !seen.contains(index)) {
        return Err(MigrationError::InconsistentShards(format!(
            "shard {} of {} missing for '{}'",
            missing, shard_count, group.logical_id
        )));
    }

    Ok(ShardedMap {
        group,
        metadata,
        entries,
    })
}
