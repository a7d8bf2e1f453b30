//! Error types for Quill

use thiserror::Error;

/// Main error type for Quill operations
#[derive(Error, Debug)]
pub enum QuillError {
    /// Sink configuration is unusable (e.g. empty target path)
    #[error("Invalid sink configuration: {0}")]
    Config(String),

    /// A single payload is larger than the configured maximum file size
    /// and can never be written, not even into an empty file
    #[error("Payload of {len} bytes exceeds maximum file size of {max} bytes")]
    Oversized {
        /// Length of the rejected payload
        len: u64,
        /// Configured maximum file size
        max: u64,
    },

    /// Size-triggered rotation could not complete
    #[error("Rotation failed: {0}")]
    Rotation(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
