//! In-memory mutation gateway.
//!
//! Holds an authoritative [`BoardState`] the way a backing store would,
//! records every call, and can be told to fail or to accept a different
//! position than the one sent. Useful for tests, demos and offline runs.

use crate::{
    error::GatewayError,
    gateway::{GatewayResult, MutationGateway},
    BoardState, Container, Error, Item, Position,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A call received by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Reorder {
        item_id: String,
        container_id: String,
        position: Position,
    },
    Delete {
        item_id: String,
    },
    ReorderColumn {
        container_id: String,
        position: Position,
    },
    DeleteColumn {
        container_id: String,
    },
}

#[derive(Debug, Default)]
struct GatewayState {
    board: BoardState,
    calls: Vec<GatewayCall>,
    reorder_failures: VecDeque<GatewayError>,
    delete_failures: VecDeque<GatewayError>,
    position_overrides: VecDeque<Position>,
    failing_ids: HashSet<String>,
}

impl GatewayState {
    fn take_failure(&mut self, is_delete: bool, id: &str) -> Option<GatewayError> {
        if self.failing_ids.contains(id) {
            return Some(GatewayError::Rejected(format!("'{id}' is refused")));
        }
        if is_delete {
            self.delete_failures.pop_front()
        } else {
            self.reorder_failures.pop_front()
        }
    }
}

fn to_gateway_error(err: Error) -> GatewayError {
    match err {
        Error::ItemNotFound(id) | Error::ContainerNotFound(id) => GatewayError::NotFound(id),
        other => GatewayError::Rejected(other.to_string()),
    }
}

/// Gateway backed by an in-memory board.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
    latency: Option<Duration>,
}

impl InMemoryGateway {
    /// Create a gateway whose backing store starts as `board`.
    pub fn new(board: BoardState) -> Self {
        Self {
            state: Mutex::new(GatewayState {
                board,
                ..GatewayState::default()
            }),
            latency: None,
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Make the next reorder (item or column) fail with `error`.
    pub fn fail_next_reorder(&self, error: GatewayError) {
        self.lock().reorder_failures.push_back(error);
    }

    /// Make the next delete (item or column) fail with `error`.
    pub fn fail_next_delete(&self, error: GatewayError) {
        self.lock().delete_failures.push_back(error);
    }

    /// Refuse every call touching `id` until [`heal`](Self::heal) is called.
    pub fn fail_id(&self, id: impl Into<String>) {
        self.lock().failing_ids.insert(id.into());
    }

    /// Stop refusing calls touching `id`.
    pub fn heal(&self, id: &str) {
        self.lock().failing_ids.remove(id);
    }

    /// Accept the next item reorder at `position` instead of the one sent.
    pub fn drift_next_reorder(&self, position: Position) {
        self.lock().position_overrides.push_back(position);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Number of delete calls (items and columns) received so far.
    pub fn delete_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, GatewayCall::Delete { .. } | GatewayCall::DeleteColumn { .. }))
            .count()
    }

    /// Number of reorder calls (items and columns) received so far.
    pub fn reorder_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    GatewayCall::Reorder { .. } | GatewayCall::ReorderColumn { .. }
                )
            })
            .count()
    }

    /// The authoritative board, as a reconciliation refetch would return it.
    pub async fn fetch_board(&self) -> BoardState {
        self.simulate_latency().await;
        self.lock().board.clone()
    }
}

#[async_trait]
impl MutationGateway for InMemoryGateway {
    async fn reorder(
        &self,
        item_id: &str,
        container_id: &str,
        position: Position,
    ) -> GatewayResult<Item> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.calls.push(GatewayCall::Reorder {
            item_id: item_id.to_string(),
            container_id: container_id.to_string(),
            position,
        });
        if let Some(err) = state.take_failure(false, item_id) {
            return Err(err);
        }

        let accepted_position = state.position_overrides.pop_front().unwrap_or(position);
        let (board, item) = state
            .board
            .with_item_moved(item_id, container_id, accepted_position)
            .map_err(to_gateway_error)?;
        state.board = board;
        Ok(item)
    }

    async fn commit_delete(&self, item_id: &str) -> GatewayResult<()> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.calls.push(GatewayCall::Delete {
            item_id: item_id.to_string(),
        });
        if let Some(err) = state.take_failure(true, item_id) {
            return Err(err);
        }

        // Deleting something already gone is not an error.
        if let Ok((board, _)) = state.board.without_item(item_id) {
            state.board = board;
        }
        Ok(())
    }

    async fn reorder_column(
        &self,
        container_id: &str,
        position: Position,
    ) -> GatewayResult<Container> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.calls.push(GatewayCall::ReorderColumn {
            container_id: container_id.to_string(),
            position,
        });
        if let Some(err) = state.take_failure(false, container_id) {
            return Err(err);
        }

        let (board, container) = state
            .board
            .with_container_moved(container_id, position)
            .map_err(to_gateway_error)?;
        state.board = board;
        Ok(container)
    }

    async fn commit_delete_column(&self, container_id: &str) -> GatewayResult<()> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.calls.push(GatewayCall::DeleteColumn {
            container_id: container_id.to_string(),
        });
        if let Some(err) = state.take_failure(true, container_id) {
            return Err(err);
        }

        if let Ok((board, _)) = state.board.without_container(container_id) {
            state.board = board;
        }
        Ok(())
    }
}
