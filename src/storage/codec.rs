//! Record encoding and typed access helpers over [`StorageEngine`].

use super::StorageEngine;
use crate::core::{MigrationError, Result};
use crate::transaction::Transaction;
use serde::{Serialize, de::DeserializeOwned};

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| MigrationError::Serialization(format!("Failed to encode record: {}", e)))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| MigrationError::Serialization(format!("Failed to decode record: {}", e)))
}

pub async fn get_typed<T: DeserializeOwned>(
    engine: &dyn StorageEngine,
    txn: &mut Transaction,
    table: &str,
    key: &str,
) -> Result<Option<T>> {
    engine
        .get(txn, table, key)
        .await?
        .map(|bytes| decode(&bytes))
        .transpose()
}

pub async fn scan_typed<T: DeserializeOwned>(
    engine: &dyn StorageEngine,
    txn: &mut Transaction,
    table: &str,
    prefix: &str,
) -> Result<Vec<(String, T)>> {
    engine
        .scan_prefix(txn, table, prefix)
        .await?
        .into_iter()
        .map(|(key, bytes)| decode(&bytes).map(|value| (key, value)))
        .collect()
}

pub fn put_typed<T: Serialize>(
    txn: &mut Transaction,
    table: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    txn.put(table, key, encode(value)?)
}

/// Run a read-only lookup in its own transaction.
pub async fn read_once<T: DeserializeOwned>(
    engine: &dyn StorageEngine,
    table: &str,
    key: &str,
) -> Result<Option<T>> {
    let mut txn = engine.begin().await?;
    let value = get_typed(engine, &mut txn, table, key).await;
    engine.rollback(txn).await?;
    value
}
