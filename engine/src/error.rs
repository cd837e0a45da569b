//! Error types for the StockSync engine.

use crate::{ChangeId, RecordId};
use thiserror::Error;

/// All possible errors from the StockSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid change: {0}")]
    InvalidChange(String),

    #[error("duplicate change id: {0}")]
    DuplicateChange(ChangeId),

    #[error("transaction amount must be positive, got {0}")]
    InvalidQuantity(i64),

    // State errors
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("insufficient stock for '{item_id}': available {available}, requested {requested}")]
    InsufficientStock {
        item_id: RecordId,
        available: u32,
        requested: u32,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
