//! Custom error types for the eb-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum EbError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The book is structurally invalid: a bad catalog, a malformed index block,
    /// an unknown escape opcode or an address past the end of a file.
    #[error("Invalid format: {0}")]
    Format(String),

    /// Compressed text could not be decoded (exhausted Huffman stream, unmappable
    /// character code).
    #[error("Decode failed: {0}")]
    Decode(String),

    /// An external character has no alternate string in the appendix.
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// A buffer or data block has an unexpected size after an operation.
    #[error("Size mismatch for {context}: expected {expected} bytes, but found {found} bytes")]
    SizeMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    /// A checksum validation failed, indicating data corruption.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The caller passed an argument outside the range the book declares.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

/// A convenience `Result` type alias using the crate's `EbError` type.
pub type Result<T> = std::result::Result<T, EbError>;

impl EbError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        EbError::Format(msg.into())
    }
}
