//! Drag-and-drop reordering with optimistic apply and rollback.
//!
//! ```text
//!          on_drag_start           on_drag_end(target)
//!   Idle ─────────────────► Dragging ─────────────────► Dropped ──► Committing ──► Idle
//!    ▲                          │                          │
//!    └──── cancel / no target ──┘                          └── rejected ──► Idle
//! ```
//!
//! A drop is validated and applied to the store synchronously; the gateway
//! is called afterwards. When the gateway refuses, the exact pre-drop
//! snapshot is reinstalled.
//!
//! Dropping the future while it waits on the gateway (e.g. under
//! `tokio::time::timeout`) counts as a failed commit: the pre-drop snapshot
//! is reinstalled and the machine returns to `Idle`.

use crate::{
    config::EngineConfig,
    error::GatewayError,
    gateway::MutationGateway,
    notify::{Notification, NotificationSurface},
    position,
    store::OptimisticStore,
    BoardState, Container, ContainerId, Error, Item, ItemId, Position, Result,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Where the drag machine currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    /// The item as it was when the drag started.
    Dragging { item: Item },
    /// Drop received, being validated and applied.
    Dropped { item_id: ItemId },
    /// Applied locally, waiting for the gateway.
    Committing {
        item_id: ItemId,
        container_id: ContainerId,
        position: Position,
    },
}

impl DragState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DragState::Idle)
    }

    fn busy_item(&self) -> Option<&str> {
        match self {
            DragState::Idle => None,
            DragState::Dragging { item } => Some(&item.id),
            DragState::Dropped { item_id } | DragState::Committing { item_id, .. } => {
                Some(item_id)
            }
        }
    }
}

/// What the dragged item was released over.
#[derive(Debug, Clone, PartialEq)]
pub enum DropTarget {
    /// A column's empty area: append at the end.
    Container(ContainerId),
    /// Another card: take its place, pushing it down.
    Sibling(ItemId),
    /// An explicit slot.
    Index {
        container_id: ContainerId,
        index: usize,
    },
}

/// How a drop (or column move) ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome<T = Item> {
    /// Nothing changed.
    Cancelled,
    /// Persisted. `accepted` is what the backing store kept; `drift` is set
    /// when that differs from what was applied locally.
    Committed { accepted: T, drift: bool },
    /// Refused locally; the store was not touched.
    Rejected(Error),
    /// The gateway refused; the pre-drop state was reinstalled.
    RolledBack(GatewayError),
}

impl<T> DropOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, DropOutcome::Committed { .. })
    }
}

/// Drives card drags and column moves against one store.
pub struct ReorderCoordinator {
    store: OptimisticStore,
    gateway: Arc<dyn MutationGateway>,
    surface: Arc<dyn NotificationSurface>,
    config: EngineConfig,
    state: watch::Sender<DragState>,
}

impl ReorderCoordinator {
    pub fn new(
        store: OptimisticStore,
        gateway: Arc<dyn MutationGateway>,
        surface: Arc<dyn NotificationSurface>,
        config: EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(DragState::Idle);
        Self {
            store,
            gateway,
            surface,
            config,
            state,
        }
    }

    /// Current drag state.
    pub fn state(&self) -> DragState {
        self.state.borrow().clone()
    }

    /// Receive every drag state transition.
    pub fn subscribe(&self) -> watch::Receiver<DragState> {
        self.state.subscribe()
    }

    /// Begin dragging `item_id`. Does not touch the store.
    pub fn on_drag_start(&self, item_id: &str) -> Result<()> {
        let item = self
            .store
            .snapshot()
            .item(item_id)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))?;

        let mut result = Ok(());
        self.state.send_if_modified(|state| match state.busy_item() {
            None => {
                *state = DragState::Dragging { item };
                true
            }
            Some(busy) => {
                result = Err(Error::DragInProgress(busy.to_string()));
                false
            }
        });
        result?;

        tracing::debug!(item_id = %item_id, "Drag started");
        Ok(())
    }

    /// Abandon the current drag. Only affects a drag not yet dropped.
    pub fn cancel_drag(&self) -> bool {
        let cancelled = self.state.send_if_modified(|state| {
            if matches!(state, DragState::Dragging { .. }) {
                *state = DragState::Idle;
                true
            } else {
                false
            }
        });
        if cancelled {
            tracing::debug!("Drag cancelled");
        }
        cancelled
    }

    /// Release the dragged item over `target` (`None`: outside any target).
    ///
    /// Only returns `Err` when no drag is in progress; every other failure is
    /// reported in the outcome and to the notification surface.
    pub async fn on_drag_end(&self, target: Option<DropTarget>) -> Result<DropOutcome> {
        let dragged = self.take_dragged()?;

        let target = match target {
            Some(DropTarget::Sibling(id)) if id == dragged.id => None,
            other => other,
        };
        let Some(target) = target else {
            self.set_state(DragState::Idle);
            tracing::debug!(item_id = %dragged.id, "Dropped outside any target");
            return Ok(DropOutcome::Cancelled);
        };

        let applied = self
            .store
            .update(|state| plan_item_move(state, &dragged.id, &target));
        let (previous, optimistic) = match applied {
            Ok(applied) => applied,
            Err(err) => return Ok(self.reject(&dragged.id, err)),
        };

        self.set_state(DragState::Committing {
            item_id: optimistic.id.clone(),
            container_id: optimistic.container_id.clone(),
            position: optimistic.position,
        });
        tracing::debug!(
            item_id = %optimistic.id,
            container_id = %optimistic.container_id,
            position = optimistic.position,
            "Move applied, committing"
        );

        let guard = CommitGuard::new(&self.store, Some(&self.state), previous, &optimistic.id);
        let result = self
            .gateway
            .reorder(&optimistic.id, &optimistic.container_id, optimistic.position)
            .await;
        let previous = guard.disarm();
        self.set_state(DragState::Idle);

        match result {
            Ok(accepted) => {
                let drift = accepted.container_id != optimistic.container_id
                    || accepted.position != optimistic.position;
                if drift {
                    tracing::warn!(
                        item_id = %accepted.id,
                        sent = optimistic.position,
                        accepted = accepted.position,
                        "Backing store kept a different placement"
                    );
                } else {
                    tracing::info!(item_id = %accepted.id, "Move committed");
                }
                Ok(DropOutcome::Committed { accepted, drift })
            }
            Err(err) => {
                tracing::warn!(item_id = %optimistic.id, error = %err, "Move failed, rolling back");
                self.store.install(previous);
                self.surface.show(
                    Notification::error("Failed to move task", self.config.error_duration)
                        .with_detail(err.to_string()),
                );
                Ok(DropOutcome::RolledBack(err))
            }
        }
    }

    /// Move a column to `target_index` among the other columns.
    ///
    /// Independent of any card drag. Returns `Err` only for an unknown column.
    pub async fn reorder_column(
        &self,
        container_id: &str,
        target_index: usize,
    ) -> Result<DropOutcome<Container>> {
        if self.store.snapshot().container(container_id).is_none() {
            return Err(Error::ContainerNotFound(container_id.to_string()));
        }

        let applied = self.store.update(|state| {
            let siblings: Vec<&Container> = state
                .containers()
                .into_iter()
                .filter(|c| c.id != container_id)
                .collect();
            let position = position::allocate(&siblings, target_index)?;
            state.with_container_moved(container_id, position)
        });
        let (previous, optimistic) = match applied {
            Ok(applied) => applied,
            Err(err) => {
                tracing::debug!(container_id = %container_id, error = %err, "Column move rejected");
                self.notify_rejection(&err);
                return Ok(DropOutcome::Rejected(err));
            }
        };

        let guard = CommitGuard::new(&self.store, None, previous, container_id);
        let result = self
            .gateway
            .reorder_column(container_id, optimistic.position)
            .await;
        let previous = guard.disarm();

        match result {
            Ok(accepted) => {
                let drift = accepted.position != optimistic.position;
                tracing::info!(container_id = %container_id, drift, "Column move committed");
                Ok(DropOutcome::Committed { accepted, drift })
            }
            Err(err) => {
                tracing::warn!(container_id = %container_id, error = %err, "Column move failed, rolling back");
                self.store.install(previous);
                self.surface.show(
                    Notification::error("Failed to reorder columns", self.config.error_duration)
                        .with_detail(err.to_string()),
                );
                Ok(DropOutcome::RolledBack(err))
            }
        }
    }

    fn take_dragged(&self) -> Result<Item> {
        let mut taken = None;
        self.state.send_if_modified(|state| {
            let DragState::Dragging { item } = state else {
                return false;
            };
            let item_id = item.id.clone();
            if let DragState::Dragging { item } =
                std::mem::replace(state, DragState::Dropped { item_id })
            {
                taken = Some(item);
            }
            true
        });
        taken.ok_or(Error::NotDragging)
    }

    fn set_state(&self, next: DragState) {
        self.state.send_replace(next);
    }

    fn reject(&self, item_id: &str, err: Error) -> DropOutcome {
        tracing::debug!(item_id = %item_id, error = %err, "Drop rejected");
        self.set_state(DragState::Idle);
        self.notify_rejection(&err);
        DropOutcome::Rejected(err)
    }

    fn notify_rejection(&self, err: &Error) {
        self.surface.show(
            Notification::error("Move not allowed", self.config.error_duration)
                .with_detail(err.to_string()),
        );
    }
}

/// Undoes an optimistic write if the commit is abandoned before the gateway
/// answers.
struct CommitGuard<'a> {
    store: &'a OptimisticStore,
    state: Option<&'a watch::Sender<DragState>>,
    previous: Arc<BoardState>,
    id: &'a str,
    armed: bool,
}

impl<'a> CommitGuard<'a> {
    fn new(
        store: &'a OptimisticStore,
        state: Option<&'a watch::Sender<DragState>>,
        previous: Arc<BoardState>,
        id: &'a str,
    ) -> Self {
        Self {
            store,
            state,
            previous,
            id,
            armed: true,
        }
    }

    /// The gateway answered; hand the pre-write snapshot back to the caller.
    fn disarm(mut self) -> Arc<BoardState> {
        self.armed = false;
        self.previous.clone()
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(id = %self.id, "Commit abandoned before the gateway answered, rolling back");
        self.store.install(self.previous.clone());
        if let Some(state) = self.state {
            state.send_replace(DragState::Idle);
        }
    }
}

/// Resolve a drop target, validate it and build the moved state.
fn plan_item_move(state: &BoardState, item_id: &str, target: &DropTarget) -> Result<(BoardState, Item)> {
    let current = state
        .item(item_id)
        .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))?;

    let (container_id, index) = match target {
        DropTarget::Container(id) => (id.as_str(), None),
        DropTarget::Sibling(id) => {
            let sibling = state
                .item(id)
                .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;
            let index = state
                .siblings_excluding(&sibling.container_id, item_id)
                .iter()
                .position(|s| s.id == *id);
            (sibling.container_id.as_str(), index)
        }
        DropTarget::Index {
            container_id,
            index,
        } => (container_id.as_str(), Some(*index)),
    };

    let container = state
        .container(container_id)
        .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;

    if container.id != current.container_id
        && !container.accepts_one_more(state.item_count(container_id))
    {
        return Err(Error::CapacityExceeded {
            container: container.id.clone(),
            limit: container.wip_limit.unwrap_or_default(),
        });
    }

    let siblings = state.siblings_excluding(container_id, item_id);
    let index = index.unwrap_or(siblings.len());
    let position = position::allocate(&siblings, index)?;

    state.with_item_moved(item_id, container_id, position)
}
