pub mod codec;
pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::StorageEngine;
pub use memory::{InMemoryStore, StoredRecord};
pub use persistence::{SnapshotManager, SnapshotMetadata, StoreSnapshot};
