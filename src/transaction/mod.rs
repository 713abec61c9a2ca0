// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Store-native transactions: each one is scoped to a single store and is
// validated optimistically at commit. There is no cross-store transaction.
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::{Change, RecordKey};
pub use state::{ScanRead, Transaction, TransactionId, TransactionState};
