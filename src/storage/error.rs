//! Storage layer error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::page::PageId;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("table file not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("table file is locked by another manager: {path:?}")]
    LockConflict { path: PathBuf },

    #[error("I/O failure on pages {first_page}..={last_page}: {source}")]
    PageIo {
        first_page: PageId,
        last_page: PageId,
        source: io::Error,
    },

    #[error("corrupt table header: {reason}")]
    CorruptHeader { reason: String },

    #[error("unsupported table format version {found} (expected 0)")]
    UnsupportedVersion { found: u32 },

    #[error("corrupt page {page_number}: {reason}")]
    CorruptPage { page_number: PageId, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Attach a page range to a raw I/O error.
    pub(crate) fn page_io(first_page: PageId, last_page: PageId, source: io::Error) -> Self {
        StorageError::PageIo {
            first_page,
            last_page,
            source,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
