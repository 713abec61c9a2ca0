use super::shard::{MapShard, ShardGroup, ShardedMap, merge_shards, partition_map};
use crate::core::{MigrationError, Result};
use crate::storage::StorageEngine;
use crate::storage::codec::{encode, scan_typed};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use tracing::{Level, event};

/// Stores one logical map per id as a group of bounded-size shard records.
///
/// Shard keys are `{logical_id}/{index:06}`; a save deletes every existing
/// shard of the id and writes the new set in the same transaction.
#[derive(Debug, Clone)]
pub struct ShardedMapEntity {
    table: String,
    shard_size_limit: NonZeroUsize,
}

impl ShardedMapEntity {
    pub fn new(table: impl Into<String>, shard_size_limit: usize) -> Result<Self> {
        let shard_size_limit = NonZeroUsize::new(shard_size_limit)
            .ok_or_else(|| MigrationError::InvalidArgument("shard size limit must be > 0".into()))?;
        Ok(Self {
            table: table.into(),
            shard_size_limit,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn shard_size_limit(&self) -> usize {
        self.shard_size_limit.get()
    }

    /// Atomically replace the stored map for `logical_id`. Returns the number
    /// of shards written.
    pub async fn save<M, K, V>(
        &self,
        engine: &dyn StorageEngine,
        logical_id: &str,
        creation_time: DateTime<Utc>,
        metadata: &M,
        map: &BTreeMap<K, V>,
    ) -> Result<usize>
    where
        M: Serialize + Clone + Send + Sync,
        K: Serialize + Ord + Clone + Send + Sync,
        V: Serialize + Clone + Send + Sync,
    {
        let prefix = record_prefix(logical_id)?;
        let parts = partition_map(map, self.shard_size_limit.get())?;
        let shard_count = parts.len();
        let group = ShardGroup {
            logical_id: logical_id.to_string(),
            creation_time,
        };

        let mut txn = engine.begin().await?;
        let existing = engine.scan_prefix(&mut txn, &self.table, &prefix).await?;
        for (key, _) in &existing {
            txn.delete(&self.table, key)?;
        }

        for (index, entries) in parts.into_iter().enumerate() {
            let shard = MapShard {
                group: group.clone(),
                index,
                shard_count,
                metadata: metadata.clone(),
                entries,
            };
            txn.put(&self.table, &shard_key(logical_id, index), encode(&shard)?)?;
        }
        engine.commit(txn).await?;

        event!(
            Level::DEBUG,
            table = %self.table,
            logical_id = %logical_id,
            entries = map.len(),
            shards = shard_count,
            replaced = existing.len(),
            "sharded map saved"
        );
        Ok(shard_count)
    }

    /// Read and merge every shard of `logical_id`; `None` when nothing is stored.
    pub async fn load<M, K, V>(
        &self,
        engine: &dyn StorageEngine,
        logical_id: &str,
    ) -> Result<Option<ShardedMap<M, K, V>>>
    where
        M: DeserializeOwned + PartialEq + Send,
        K: DeserializeOwned + Ord + fmt::Display + Send,
        V: DeserializeOwned + Send,
    {
        let prefix = record_prefix(logical_id)?;
        let mut txn = engine.begin().await?;
        let shards = scan_typed::<MapShard<M, K, V>>(engine, &mut txn, &self.table, &prefix).await;
        engine.rollback(txn).await?;

        let shards: Vec<MapShard<M, K, V>> = shards?.into_iter().map(|(_, shard)| shard).collect();
        if shards.is_empty() {
            return Ok(None);
        }
        merge_shards(shards).map(Some)
    }

    /// Distinct logical ids with at least one shard stored.
    pub async fn list_ids(&self, engine: &dyn StorageEngine) -> Result<Vec<String>> {
        let mut txn = engine.begin().await?;
        let records = engine.scan_prefix(&mut txn, &self.table, "").await;
        engine.rollback(txn).await?;

        let ids: BTreeSet<String> = records?
            .into_iter()
            .filter_map(|(key, _)| key.rsplit_once('/').map(|(id, _)| id.to_string()))
            .collect();
        Ok(ids.into_iter().collect())
    }

    /// Number of shard records currently stored for `logical_id`.
    pub async fn shard_count(&self, engine: &dyn StorageEngine, logical_id: &str) -> Result<usize> {
        let prefix = record_prefix(logical_id)?;
        let mut txn = engine.begin().await?;
        let records = engine.scan_prefix(&mut txn, &self.table, &prefix).await;
        engine.rollback(txn).await?;
        Ok(records?.len())
    }
}

/// Key prefix shared by every record of `id`. Ids may not contain `/`, which
/// would let one id's prefix match another's records.
pub fn record_prefix(id: &str) -> Result<String> {
    if id.is_empty() || id.contains('/') {
        return Err(MigrationError::InvalidArgument(format!(
            "'{}' is not a valid record id: must be non-empty and free of '/'",
            id
        )));
    }
    Ok(format!("{}/", id))
}

fn shard_key(logical_id: &str, index: usize) -> String {
    format!("{}/{:06}", logical_id, index)
}
