use crate::core::Result;
use crate::transaction::Transaction;
use async_trait::async_trait;

/// Storage engine trait - one implementation per backing store.
///
/// All access goes through a store-native [`Transaction`]: reads are
/// recorded on it, writes are staged on it, and `commit` applies the staged
/// writes atomically or fails with `TransactionConflict` if anything the
/// transaction read has changed in the meantime.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Human-readable store name, used in logs and error messages
    fn name(&self) -> &str;

    /// Start a transaction against this store
    async fn begin(&self) -> Result<Transaction>;

    /// Read one record, seeing the transaction's own staged writes
    async fn get(&self, txn: &mut Transaction, table: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read every record of `table` whose key starts with `prefix`, in key order
    async fn scan_prefix(
        &self,
        txn: &mut Transaction,
        table: &str,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>>;

    /// Validate and apply the transaction
    async fn commit(&self, txn: Transaction) -> Result<()>;

    /// Discard the transaction
    async fn rollback(&self, mut txn: Transaction) -> Result<()> {
        txn.rollback()
    }
}
