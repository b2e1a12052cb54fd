use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File is open: {0}")]
    FileOpen(String),

    #[error("Invalid file handle: {0}")]
    InvalidFile(usize),

    #[error("Invalid page number: {0}")]
    InvalidPage(usize),

    #[error("End of file")]
    EndOfFile,

    #[error("Page already fixed: page_id={0}")]
    PageFixed(usize),

    #[error("Page not in buffer: page_id={0}")]
    PageNotInBuf(usize),

    #[error("Page already unfixed: page_id={0}")]
    PageUnfixed(usize),

    #[error("All buffer frames are fixed")]
    BufferExhausted,

    #[error("File still has {0} fixed page(s)")]
    PagesStillFixed(usize),

    #[error("Operation requires an empty buffer pool")]
    PoolNotEmpty,

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("File handle limit reached")]
    TooManyOpenFiles,
}

pub type FileResult<T> = Result<T, FileError>;
