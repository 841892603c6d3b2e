//! Persistence of built indices.
//!
//! Each document is stored as two artifacts that are always loaded together:
//! a human-readable section file and a binary chunk file.

pub mod error;
pub mod metadata;
pub mod persistence;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use metadata::{INDEX_FORMAT_VERSION, IndexMetadata};
pub use persistence::{IndexPersistence, StoredIndex};
pub use store::{FileIndexStore, IndexStore, MemoryIndexStore};
