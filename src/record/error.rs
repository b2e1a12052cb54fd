use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlottedError {
    #[error("No space left in page")]
    NoSpace,

    #[error("Invalid slot: {0}")]
    InvalidSlot(i16),

    #[error("No more records in page")]
    Empty,
}

pub type SlottedResult<T> = Result<T, SlottedError>;
