use super::StorageEngine;
use super::persistence::{SnapshotMetadata, StoreSnapshot};
use crate::core::{MigrationError, Result};
use crate::transaction::{RecordKey, ScanRead, Transaction, TransactionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{Level, event};

/// One committed record version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub version: u64,
    pub data: Vec<u8>,
}

type Tables = HashMap<String, BTreeMap<String, StoredRecord>>;

/// In-process keyed record store.
///
/// Stands in for either backing store during the migration. Availability can
/// be toggled to simulate an outage of one side.
pub struct InMemoryStore {
    name: String,
    tables: RwLock<Tables>,
    next_version: AtomicU64,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let max_version = snapshot
            .tables
            .values()
            .flat_map(|table| table.values())
            .map(|record| record.version)
            .max()
            .unwrap_or(0);

        Self {
            name: snapshot.name,
            tables: RwLock::new(snapshot.tables),
            next_version: AtomicU64::new(max_version + 1),
            available: AtomicBool::new(true),
        }
    }

    /// Capture every committed record
    pub async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read().await.clone();
        StoreSnapshot::new(self.name.clone(), tables)
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        event!(Level::INFO, store = %self.name, available, "store availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of committed records in a table
    pub async fn record_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map(BTreeMap::len).unwrap_or(0)
    }

    /// Committed keys of a table, in order
    pub async fn keys(&self, table: &str) -> Vec<String> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata::describe(&*self.tables.read().await)
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(MigrationError::StoreUnavailable(self.name.clone()))
        }
    }

    fn check_owner(&self, txn: &Transaction) -> Result<()> {
        if txn.store() != self.name {
            return Err(MigrationError::InvalidArgument(format!(
                "Transaction {} belongs to store '{}', not '{}'",
                txn.id(),
                txn.store(),
                self.name
            )));
        }
        Ok(())
    }

    fn prefix_range<'a>(
        tables: &'a Tables,
        table: &str,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a StoredRecord)> + 'a {
        tables
            .get(table)
            .into_iter()
            .flat_map(move |records| records.range(prefix.to_string()..))
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    fn validate(tables: &Tables, txn: &Transaction) -> Result<()> {
        for (record, observed) in txn.reads() {
            let current = tables
                .get(&record.table)
                .and_then(|records| records.get(&record.key))
                .map(|stored| stored.version);
            if current != *observed {
                return Err(MigrationError::TransactionConflict(format!(
                    "{} changed after {} read it",
                    record,
                    txn.id()
                )));
            }
        }

        for scan in txn.scans() {
            let current: BTreeMap<String, u64> =
                Self::prefix_range(tables, &scan.table, &scan.prefix)
                    .map(|(key, stored)| (key.clone(), stored.version))
                    .collect();
            if current != scan.seen {
                return Err(MigrationError::TransactionConflict(format!(
                    "records under {}/{} changed after {} scanned them",
                    scan.table,
                    scan.prefix,
                    txn.id()
                )));
            }
        }

        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl StorageEngine for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<Transaction> {
        self.check_available()?;
        Ok(Transaction::new(TransactionId::new(), self.name.clone()))
    }

    async fn get(&self, txn: &mut Transaction, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        self.check_owner(txn)?;

        let record = RecordKey::new(table, key);
        if let Some(staged) = txn.staged(&record) {
            return Ok(staged.map(<[u8]>::to_vec));
        }

        let tables = self.tables.read().await;
        let stored = tables.get(table).and_then(|records| records.get(key));
        txn.record_read(record, stored.map(|s| s.version));
        Ok(stored.map(|s| s.data.clone()))
    }

    async fn scan_prefix(
        &self,
        txn: &mut Transaction,
        table: &str,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.check_available()?;
        self.check_owner(txn)?;

        let mut seen = BTreeMap::new();
        let mut visible: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        {
            let tables = self.tables.read().await;
            for (key, stored) in Self::prefix_range(&tables, table, prefix) {
                seen.insert(key.clone(), stored.version);
                visible.insert(key.clone(), stored.data.clone());
            }
        }
        txn.record_scan(ScanRead {
            table: table.to_string(),
            prefix: prefix.to_string(),
            seen,
        });

        for (key, staged) in txn.staged_with_prefix(table, prefix) {
            match staged {
                Some(data) => {
                    visible.insert(key, data);
                }
                None => {
                    visible.remove(&key);
                }
            }
        }

        Ok(visible.into_iter().collect())
    }

    async fn commit(&self, mut txn: Transaction) -> Result<()> {
        self.check_available()?;
        self.check_owner(&txn)?;

        let mut tables = self.tables.write().await;
        Self::validate(&tables, &txn)?;
        txn.mark_committed()?;

        for change in txn.changes() {
            let record = change.record();
            match change.data() {
                Some(data) => {
                    let version = self.next_version.fetch_add(1, Ordering::SeqCst);
                    tables.entry(record.table.clone()).or_default().insert(
                        record.key.clone(),
                        StoredRecord {
                            version,
                            data: data.to_vec(),
                        },
                    );
                }
                None => {
                    if let Some(records) = tables.get_mut(&record.table) {
                        records.remove(&record.key);
                    }
                }
            }
        }

        event!(
            Level::DEBUG,
            store = %self.name,
            txn = %txn.id(),
            changes = txn.change_count(),
            "transaction committed"
        );
        Ok(())
    }
}
