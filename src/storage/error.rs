use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt index file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Missing or unreadable artifacts, treated as a cache miss by callers.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Corrupt { .. } | Self::Serialization(_)
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
