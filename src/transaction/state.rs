// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through Active -> Committed/Aborted and is bound to
// exactly one store. Concurrency control is optimistic:
// - every read records the version it observed (or the key's absence)
// - every prefix scan records the keys and versions it saw
// - commit re-validates both under the store's write lock
//
// ============================================================================

use super::change::{Change, RecordKey};
use crate::core::{MigrationError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Keys and versions observed by one prefix scan.
#[derive(Debug, Clone)]
pub struct ScanRead {
    pub table: String,
    pub prefix: String,
    pub seen: BTreeMap<String, u64>,
}

/// A store-native transaction.
///
/// Obtained from [`StorageEngine::begin`](crate::storage::StorageEngine::begin)
/// and handed back to the same engine for commit.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    store: String,
    state: TransactionState,
    /// Version observed per record; `None` means the record was absent
    reads: HashMap<RecordKey, Option<u64>>,
    scans: Vec<ScanRead>,
    changes: Vec<Change>,
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, store: impl Into<String>) -> Self {
        Self {
            id,
            store: store.into(),
            state: TransactionState::Active,
            reads: HashMap::new(),
            scans: Vec::new(),
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Name of the store this transaction belongs to
    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn reads(&self) -> &HashMap<RecordKey, Option<u64>> {
        &self.reads
    }

    pub fn scans(&self) -> &[ScanRead] {
        &self.scans
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Stage an insert-or-overwrite of `table/key`.
    pub fn put(&mut self, table: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.record_change(Change::Put {
            record: RecordKey::new(table, key),
            data,
        })
    }

    /// Stage a removal of `table/key`.
    pub fn delete(&mut self, table: &str, key: &str) -> Result<()> {
        self.record_change(Change::Delete {
            record: RecordKey::new(table, key),
        })
    }

    fn record_change(&mut self, change: Change) -> Result<()> {
        self.ensure_active("record change")?;
        self.changes.push(change);
        Ok(())
    }

    /// The latest staged state of a record: `Some(Some(data))` for a pending
    /// put, `Some(None)` for a pending delete, `None` if untouched.
    pub fn staged(&self, record: &RecordKey) -> Option<Option<&[u8]>> {
        self.changes
            .iter()
            .rev()
            .find(|change| change.record() == record)
            .map(Change::data)
    }

    /// Staged state of every record in `table` whose key starts with `prefix`.
    pub fn staged_with_prefix(
        &self,
        table: &str,
        prefix: &str,
    ) -> BTreeMap<String, Option<Vec<u8>>> {
        let mut staged = BTreeMap::new();
        for change in &self.changes {
            let record = change.record();
            if record.table == table && record.key.starts_with(prefix) {
                staged.insert(record.key.clone(), change.data().map(<[u8]>::to_vec));
            }
        }
        staged
    }

    /// Remember the version of a record as first observed by this transaction.
    pub fn record_read(&mut self, record: RecordKey, version: Option<u64>) {
        self.reads.entry(record).or_insert(version);
    }

    pub fn record_scan(&mut self, scan: ScanRead) {
        self.scans.push(scan);
    }

    pub fn mark_committed(&mut self) -> Result<()> {
        self.ensure_active("commit")?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active("rollback")?;
        self.changes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }

    fn ensure_active(&self, action: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(MigrationError::InvalidArgument(format!(
                "Cannot {}: transaction {} is already {}",
                action, self.id, self.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = Transaction::new(TransactionId::new(), "store_a");

        assert_eq!(txn.state(), TransactionState::Active);
        assert!(!txn.state().is_terminal());

        txn.mark_committed().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.state().is_terminal());
        assert!(txn.mark_committed().is_err());
    }

    #[test]
    fn test_rollback_clears_changes() {
        let mut txn = Transaction::new(TransactionId::new(), "store_a");
        txn.put("t", "k", vec![1]).unwrap();
        assert_eq!(txn.change_count(), 1);

        txn.rollback().unwrap();
        assert_eq!(txn.change_count(), 0);
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(txn.put("t", "k", vec![2]).is_err());
    }

    #[test]
    fn test_latest_staged_change_wins() {
        let mut txn = Transaction::new(TransactionId::new(), "store_a");
        let record = RecordKey::new("t", "k");
        assert_eq!(txn.staged(&record), None);

        txn.put("t", "k", vec![1]).unwrap();
        txn.delete("t", "k").unwrap();
        assert_eq!(txn.staged(&record), Some(None));

        txn.put("t", "k", vec![3]).unwrap();
        assert_eq!(txn.staged(&record), Some(Some(&[3u8][..])));
    }

    #[test]
    fn test_first_observed_version_is_kept() {
        let mut txn = Transaction::new(TransactionId::new(), "store_a");
        let record = RecordKey::new("t", "k");
        txn.record_read(record.clone(), None);
        txn.record_read(record.clone(), Some(7));
        assert_eq!(txn.reads().get(&record), Some(&None));
    }
}
