//! The two store-native representations of a dual-store entity.

use super::entity::{DualStoreEntity, RevisionedEntity, ShardedEntity, StoreDao};
use crate::core::{MigrationError, Result};
use crate::sharded::{ShardedMapEntity, record_prefix};
use crate::storage::StorageEngine;
use crate::storage::codec::{decode, put_typed};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{Level, event};

/// StoreA representation: the entity's entries as a sharded map.
pub struct ShardedStoreDao<T> {
    engine: Arc<dyn StorageEngine>,
    shards: ShardedMapEntity,
    _entity: PhantomData<fn() -> T>,
}

impl<T: ShardedEntity> ShardedStoreDao<T> {
    pub fn new(engine: Arc<dyn StorageEngine>, shards: ShardedMapEntity) -> Self {
        Self {
            engine,
            shards,
            _entity: PhantomData,
        }
    }

    pub fn shards(&self) -> &ShardedMapEntity {
        &self.shards
    }
}

#[async_trait]
impl<T: ShardedEntity> StoreDao<T> for ShardedStoreDao<T> {
    fn store_name(&self) -> &str {
        self.engine.name()
    }

    async fn save(&self, entity: &T) -> Result<()> {
        self.shards
            .save(
                self.engine.as_ref(),
                &entity.id().to_string(),
                entity.creation_time(),
                &entity.metadata(),
                entity.entries(),
            )
            .await
            .map(|_| ())
    }

    async fn load(&self, id: &T::Id) -> Result<Option<T>> {
        match self.shards.load(self.engine.as_ref(), &id.to_string()).await? {
            Some(map) => T::assemble(id.clone(), map).map(Some),
            None => Ok(None),
        }
    }

    async fn list_ids(&self) -> Result<Vec<T::Id>> {
        self.shards
            .list_ids(self.engine.as_ref())
            .await?
            .iter()
            .map(|raw| parse_id::<T>(raw))
            .collect()
    }
}

/// StoreB representation: one immutable row per revision, keyed
/// `{id}/{revision:020}`. The latest revision is the highest one.
pub struct RevisionStoreDao<T> {
    engine: Arc<dyn StorageEngine>,
    table: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: RevisionedEntity> RevisionStoreDao<T> {
    pub fn new(engine: Arc<dyn StorageEngine>, table: impl Into<String>) -> Self {
        Self {
            engine,
            table: table.into(),
            _entity: PhantomData,
        }
    }

    /// Every stored revision number of `id`, ascending.
    pub async fn revisions(&self, id: &T::Id) -> Result<Vec<u64>> {
        let prefix = record_prefix(&id.to_string())?;
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;
        let rows = engine.scan_prefix(&mut txn, &self.table, &prefix).await;
        engine.rollback(txn).await?;

        rows?.iter().map(|(key, _)| parse_revision(key)).collect()
    }
}

#[async_trait]
impl<T: RevisionedEntity> StoreDao<T> for RevisionStoreDao<T> {
    fn store_name(&self) -> &str {
        self.engine.name()
    }

    /// Appends revision `max + 1`. Concurrent saves of one id conflict at commit.
    async fn save(&self, entity: &T) -> Result<()> {
        let id = entity.id().to_string();
        let prefix = record_prefix(&id)?;
        let engine = self.engine.as_ref();

        let mut txn = engine.begin().await?;
        let rows = engine.scan_prefix(&mut txn, &self.table, &prefix).await?;
        let latest = match rows.last() {
            Some((key, _)) => parse_revision(key)?,
            None => 0,
        };
        let revision = latest + 1;

        put_typed(
            &mut txn,
            &self.table,
            &revision_key(&id, revision),
            &entity.clone().with_revision_id(revision),
        )?;
        engine.commit(txn).await?;

        event!(
            Level::DEBUG,
            kind = T::KIND,
            id = %id,
            revision,
            store = engine.name(),
            "revision saved"
        );
        Ok(())
    }

    async fn load(&self, id: &T::Id) -> Result<Option<T>> {
        let prefix = record_prefix(&id.to_string())?;
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;
        let rows = engine.scan_prefix(&mut txn, &self.table, &prefix).await;
        engine.rollback(txn).await?;

        rows?.last().map(|(_, bytes)| decode::<T>(bytes)).transpose()
    }

    async fn list_ids(&self) -> Result<Vec<T::Id>> {
        let engine = self.engine.as_ref();
        let mut txn = engine.begin().await?;
        let rows = engine.scan_prefix(&mut txn, &self.table, "").await;
        engine.rollback(txn).await?;

        let rows = rows?;
        let ids: BTreeSet<&str> = rows
            .iter()
            .filter_map(|(key, _)| key.rsplit_once('/').map(|(id, _)| id))
            .collect();
        ids.into_iter().map(parse_id::<T>).collect()
    }
}

fn revision_key(id: &str, revision: u64) -> String {
    format!("{}/{:020}", id, revision)
}

fn parse_revision(key: &str) -> Result<u64> {
    key.rsplit_once('/')
        .and_then(|(_, revision)| revision.parse().ok())
        .ok_or_else(|| MigrationError::Serialization(format!("Malformed revision key '{}'", key)))
}

fn parse_id<T: DualStoreEntity>(raw: &str) -> Result<T::Id> {
    raw.parse().map_err(|_| {
        MigrationError::Serialization(format!("Malformed {} id '{}' in store", T::KIND, raw))
    })
}
