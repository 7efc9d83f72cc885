//! Mutation gateway contract.
//!
//! The engine commits to the backing store only through this trait. Calls
//! may fail; the engine recovers by rolling back or restoring, never by
//! retrying.

use crate::{error::GatewayError, Container, Item, Position};
use async_trait::async_trait;

/// Result type for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Asynchronous writes against the backing store.
#[async_trait]
pub trait MutationGateway: Send + Sync {
    /// Persist an item's new container and position.
    ///
    /// Returns the item as the backing store accepted it, which may differ
    /// from what was sent.
    async fn reorder(
        &self,
        item_id: &str,
        container_id: &str,
        position: Position,
    ) -> GatewayResult<Item>;

    /// Permanently delete an item.
    async fn commit_delete(&self, item_id: &str) -> GatewayResult<()>;

    /// Persist a column's new position.
    async fn reorder_column(&self, container_id: &str, position: Position)
        -> GatewayResult<Container>;

    /// Permanently delete a column and its items.
    async fn commit_delete_column(&self, container_id: &str) -> GatewayResult<()>;
}
