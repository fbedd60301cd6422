//! Error types for the index.

use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur opening or operating on the index.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `put` was called with an empty key.
    #[error("key required")]
    KeyRequired,

    /// Key exceeds `MAX_KEY_SIZE`.
    #[error("key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },

    /// Value exceeds `MAX_VALUE_SIZE`.
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// Meta page magic did not match.
    #[error("invalid index file: {0}")]
    Invalid(String),

    /// Meta page version is not one this build understands.
    #[error("version mismatch: file is version {found}, this build supports {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// Meta page checksum did not verify.
    #[error("meta page checksum error")]
    Checksum,

    /// Existing file is larger than `MAX_MAP_SIZE`.
    #[error("file size exceeds maximum map size")]
    FileTooLarge,

    /// Another handle already holds a conflicting advisory file lock.
    #[error("database file is locked by another process")]
    LockBusy,

    /// A page id was referenced that does not exist in the file.
    #[error("page {0} not found")]
    PageNotFound(u64),

    /// The index was opened read-only but a mutating operation was attempted.
    #[error("index is read-only")]
    ReadOnly,

    /// Page or meta bytes were malformed in a way not covered above.
    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl StorageError {
    /// Create a corruption error with a message.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an invalid-file error with a message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages_mention_the_numbers() {
        let err = StorageError::KeyTooLarge { size: 200, max: 128 };
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn test_io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
