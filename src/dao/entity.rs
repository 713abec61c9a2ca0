use crate::core::Result;
use crate::sharded::ShardedMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How comparison reports refer to entities of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    /// `ReservedList 'tld'`, summarised as `Found 1 unequal ReservedList(s).`
    Quoted,
    /// `PremiumList with name tld`, summarised as `Found 1 unequal list(s).`
    Named,
}

/// An entity kept in both stores and compared entry by entry.
pub trait DualStoreEntity: Clone + Send + Sync + 'static {
    type Id: Clone + Ord + fmt::Display + FromStr + Send + Sync;
    type Key: Ord + Clone + fmt::Display + Serialize + DeserializeOwned + Send + Sync;
    type Value: PartialEq + Clone + fmt::Display + Serialize + DeserializeOwned + Send + Sync;

    /// Label used in logs, errors and comparison reports
    const KIND: &'static str;

    const REPORT_STYLE: ReportStyle = ReportStyle::Quoted;

    fn id(&self) -> Self::Id;

    /// The map compared between stores
    fn entries(&self) -> &BTreeMap<Self::Key, Self::Value>;
}

/// Entities whose StoreA form is a sharded map plus per-entity metadata.
pub trait ShardedEntity: DualStoreEntity {
    type Metadata: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync;

    fn creation_time(&self) -> DateTime<Utc>;
    fn metadata(&self) -> Self::Metadata;
    fn assemble(
        id: Self::Id,
        map: ShardedMap<Self::Metadata, Self::Key, Self::Value>,
    ) -> Result<Self>;
}

/// Entities whose StoreB form is one immutable row per revision.
pub trait RevisionedEntity: DualStoreEntity + Serialize + DeserializeOwned {
    fn revision_id(&self) -> Option<u64>;
    fn with_revision_id(self, revision_id: u64) -> Self;
}

/// Store-specific persistence for one entity type.
#[async_trait]
pub trait StoreDao<T: DualStoreEntity>: Send + Sync {
    fn store_name(&self) -> &str;

    async fn save(&self, entity: &T) -> Result<()>;

    /// Latest stored value of `id`
    async fn load(&self, id: &T::Id) -> Result<Option<T>>;

    async fn list_ids(&self) -> Result<Vec<T::Id>>;
}
