//! Error types for flatpack
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using PackError
pub type Result<T> = std::result::Result<T, PackError>;

/// Unified error type for flatpack operations
#[derive(Debug, Error)]
pub enum PackError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // File Format Errors
    // -------------------------------------------------------------------------
    #[error("not a valid store file: {0}")]
    CorruptFile(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    // -------------------------------------------------------------------------
    // Value Encoding Errors
    // -------------------------------------------------------------------------
    #[error("corrupt value: {0}")]
    CorruptValue(String),
}
