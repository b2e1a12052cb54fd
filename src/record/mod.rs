//! Variable-length record storage on slotted pages

mod error;
pub mod slotted;

pub use error::{SlottedError, SlottedResult};
pub use slotted::SlotId;
