//! Error types for the kanban engine.

use crate::{ContainerId, ItemId, Position};
use thiserror::Error;

/// Failure reported by a [`MutationGateway`](crate::MutationGateway) call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by backing store: {0}")]
    Rejected(String),
}

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Lookup errors
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("container not found: {0}")]
    ContainerNotFound(ContainerId),

    // Validation rejections
    #[error("target index {index} out of range for {len} siblings")]
    InvalidTargetIndex { index: usize, len: usize },

    #[error("container '{container}' is at its limit of {limit} items")]
    CapacityExceeded { container: ContainerId, limit: usize },

    #[error("no room for a position between {left} and {right}")]
    PositionGapExhausted { left: Position, right: Position },

    #[error("container '{container}' still holds {items} items")]
    ContainerNotEmpty { container: ContainerId, items: usize },

    // Drag lifecycle misuse
    #[error("no drag in progress")]
    NotDragging,

    #[error("drag already in progress for item {0}")]
    DragInProgress(ItemId),

    // Commit errors
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Coarse classification used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local, synchronous check failed; nothing reached the network.
    ValidationRejection,
    /// A commit against the backing store failed and was rolled back.
    TransientGateway,
    /// The caller drove the engine incorrectly (stale ids, wrong phase).
    Misuse,
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidTargetIndex { .. }
            | Error::CapacityExceeded { .. }
            | Error::PositionGapExhausted { .. }
            | Error::ContainerNotEmpty { .. } => ErrorCategory::ValidationRejection,
            Error::Gateway(_) => ErrorCategory::TransientGateway,
            Error::ItemNotFound(_)
            | Error::ContainerNotFound(_)
            | Error::NotDragging
            | Error::DragInProgress(_)
            | Error::InvalidSnapshot(_) => ErrorCategory::Misuse,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
