use super::types::PrimaryStore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("{entity} '{id}' not found in primary store {store}")]
    NotFound {
        entity: String,
        id: String,
        store: PrimaryStore,
    },

    #[error("{entity} in the secondary store ({store}) is unavailable: {reason}")]
    SecondaryUnavailable {
        entity: String,
        store: PrimaryStore,
        reason: String,
    },

    #[error("{0}")]
    ConsistencyViolation(String),

    #[error("Lock '{resource}' ({scope}) is held by '{owner}' until {expires}")]
    LockHeld {
        resource: String,
        scope: String,
        owner: String,
        expires: String,
    },

    #[error("Lock '{resource}' ({scope}) is not held by '{owner}'")]
    LockNotHeld {
        resource: String,
        scope: String,
        owner: String,
    },

    #[error("Inconsistent shards: {0}")]
    InconsistentShards(String),

    #[error("Store '{0}' is unavailable")]
    StoreUnavailable(String),

    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Poisoned lock: {0}")]
    Poisoned(String),
}

impl MigrationError {
    /// True for failures of the store itself rather than of the data in it.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            MigrationError::StoreUnavailable(_) | MigrationError::TransactionConflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl<T> From<std::sync::PoisonError<T>> for MigrationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned(err.to_string())
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
