use thiserror::Error;

use crate::file::FileError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Invalid magic number in index file header")]
    InvalidMagic,

    #[error("Corrupted index node at page {0}")]
    CorruptedNode(usize),
}
