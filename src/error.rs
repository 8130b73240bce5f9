//! Error kinds surfaced at the operation boundary

use crate::order::OrderStatus;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Record is referenced by dependent rows: {0}")]
    Referenced(String),
    // Unknown ids and cross-account access attempts report identically,
    // so a caller cannot probe the account boundary.
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Identifier encoding failed: {0}")]
    IdEncoding(String),
}

impl LedgerError {
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }
}
