//! Error types for the paging subsystem.
//!
//! Operational failures are returned, never panicked on. A failed transition
//! leaves the buffer resident wherever it already was.

use thiserror::Error;

use super::key::BufferKey;
use crate::scheduler::ThreadPoolError;

/// Errors raised by the page-file allocator and its raw I/O.
#[derive(Debug, Error)]
pub enum PageFileError {
    #[error("Page file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("Size mismatch: handle covers {expected} bytes, data has {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Page of {size} bytes exceeds page file ceiling of {max} bytes")]
    PageTooLarge { size: u64, max: u64 },

    #[error("Disk capacity exhausted across {files} page files")]
    CapacityExhausted { files: usize },

    #[error("Unknown page file: {0}")]
    UnknownPageFile(u32),

    #[error("Invalid page handle")]
    InvalidHandle,
}

/// Errors raised by buffer transitions and registry operations.
#[derive(Debug, Error)]
pub enum PagingError {
    #[error("No source tier holds data for {key}")]
    NoSource { key: BufferKey },

    #[error("Buffer already exists: {0}")]
    AlreadyExists(BufferKey),

    #[error("Disk paging failed: {0}")]
    Disk(#[from] PageFileError),

    #[error("Corrupt page for {key}: {reason}")]
    Corrupt { key: BufferKey, reason: String },

    #[error("Operation aborted: {0}")]
    Aborted(String),
}

impl From<ThreadPoolError> for PagingError {
    fn from(e: ThreadPoolError) -> Self {
        Self::Aborted(e.to_string())
    }
}

impl PagingError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Disk(PageFileError::CapacityExhausted { .. })
                | Self::Disk(PageFileError::Io(_))
                | Self::Aborted(_)
        )
    }
}

/// Errors raised when parsing a [`BufferKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Buffer key is empty")]
    Empty,

    #[error("Buffer key must start with '/': {0}")]
    NotAbsolute(String),

    #[error("Buffer key has an empty segment: {0}")]
    EmptySegment(String),

    #[error("Buffer key contains invalid character {ch:?}: {key}")]
    InvalidCharacter { key: String, ch: char },
}
