//! Board facade.
//!
//! Owns one store, one drag coordinator and one undo queue, all talking to
//! the same gateway and notification surface. Applications normally hold a
//! [`Board`] and nothing else.

use crate::{
    config::EngineConfig,
    coordinator::{DropOutcome, DropTarget, ReorderCoordinator},
    gateway::MutationGateway,
    notify::{Notification, NotificationSurface},
    position,
    registry::ActionKind,
    schedule::ScheduledTask,
    store::OptimisticStore,
    undo::{DeleteRequest, DeletionTicket, PendingSummary, UndoQueue},
    ActionId, BoardState, Container, Error, Item, Result,
};
use std::sync::Arc;

/// A task board with optimistic moves and undoable deletes.
pub struct Board {
    store: OptimisticStore,
    coordinator: ReorderCoordinator,
    undo: UndoQueue,
    gateway: Arc<dyn MutationGateway>,
    surface: Arc<dyn NotificationSurface>,
    config: EngineConfig,
    janitor: ScheduledTask,
}

impl Board {
    /// Create a board showing `state`.
    ///
    /// Must be called from within a Tokio runtime; starts the periodic sweep
    /// of expired undo actions.
    pub fn new(
        state: BoardState,
        gateway: Arc<dyn MutationGateway>,
        surface: Arc<dyn NotificationSurface>,
        config: EngineConfig,
    ) -> Self {
        let store = OptimisticStore::new(state);
        let coordinator = ReorderCoordinator::new(
            store.clone(),
            gateway.clone(),
            surface.clone(),
            config.clone(),
        );
        let undo = UndoQueue::new(surface.clone(), config.clone());
        let janitor = undo.spawn_janitor();

        tracing::info!(
            containers = store.snapshot().containers().len(),
            items = store.snapshot().len(),
            "Board ready"
        );

        Self {
            store,
            coordinator,
            undo,
            gateway,
            surface,
            config,
            janitor,
        }
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    /// The current view.
    pub fn snapshot(&self) -> Arc<BoardState> {
        self.store.snapshot()
    }

    pub fn coordinator(&self) -> &ReorderCoordinator {
        &self.coordinator
    }

    pub fn undo_queue(&self) -> &UndoQueue {
        &self.undo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drag `item_id` and drop it on `target` in one go.
    pub async fn move_item(&self, item_id: &str, target: DropTarget) -> Result<DropOutcome> {
        self.coordinator.on_drag_start(item_id)?;
        self.coordinator.on_drag_end(Some(target)).await
    }

    /// Move a column to `target_index` among the other columns.
    pub async fn reorder_column(
        &self,
        container_id: &str,
        target_index: usize,
    ) -> Result<DropOutcome<Container>> {
        self.coordinator
            .reorder_column(container_id, target_index)
            .await
    }

    /// Delete a card, undoable until the grace period runs out.
    ///
    /// `label` overrides the title shown in the notification.
    pub fn delete_item(&self, item_id: &str, label: Option<&str>) -> Result<DeletionTicket> {
        let item = self
            .snapshot()
            .item(item_id)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))?;
        let label = label.map(str::to_string).or_else(|| item.title().map(str::to_string));

        let id = item.id.clone();
        let gateway = self.gateway.clone();
        let remove_store = self.store.clone();
        let restore_store = self.store.clone();

        let mut request = DeleteRequest::new(ActionKind::Task, item, move || async move {
            gateway.commit_delete(&id).await
        })
        .on_optimistic_remove({
            let id = item_id.to_string();
            move || {
                if let Err(err) = remove_store.remove_item(&id) {
                    tracing::warn!(item_id = %id, error = %err, "Optimistic removal failed");
                }
            }
        })
        .on_restore(move |item: Item| restore_store.restore_item(item));
        if let Some(label) = label {
            request = request.label(label);
        }

        Ok(self.undo.delete_item(request))
    }

    /// Delete an empty column, undoable like a card.
    ///
    /// A column that still shows cards is refused with
    /// [`Error::ContainerNotEmpty`]; its cards have to be moved or deleted
    /// first.
    pub fn delete_column(&self, container_id: &str) -> Result<DeletionTicket> {
        let (_, snapshot) = self.snapshot().without_container(container_id)?;
        if !snapshot.items.is_empty() {
            let err = Error::ContainerNotEmpty {
                container: container_id.to_string(),
                items: snapshot.items.len(),
            };
            tracing::debug!(container_id = %container_id, error = %err, "Column delete refused");
            self.surface.show(
                Notification::error("Cannot delete column", self.config.error_duration)
                    .with_detail(format!(
                        "\"{}\" still contains {} tasks. Move or delete them first.",
                        snapshot.container.title,
                        snapshot.items.len()
                    )),
            );
            return Err(err);
        }
        let label = snapshot.container.title.clone();

        let id = container_id.to_string();
        let gateway = self.gateway.clone();
        let remove_store = self.store.clone();
        let restore_store = self.store.clone();

        let request = DeleteRequest::new(ActionKind::Column, snapshot, move || async move {
            gateway.commit_delete_column(&id).await
        })
        .label(label)
        .on_optimistic_remove({
            let id = container_id.to_string();
            move || {
                if let Err(err) = remove_store.remove_container(&id) {
                    tracing::warn!(container_id = %id, error = %err, "Optimistic removal failed");
                }
            }
        })
        .on_restore(move |snapshot| restore_store.restore_container(snapshot));

        Ok(self.undo.delete_item(request))
    }

    /// Undo a pending deletion. `false` if it already resolved.
    pub async fn undo(&self, action_id: ActionId) -> bool {
        self.undo.undo(action_id).await
    }

    /// Close a deletion's notification, keeping the deletion scheduled.
    pub fn dismiss(&self, action_id: ActionId) -> bool {
        self.undo.dismiss(action_id)
    }

    /// Deletions still waiting or committing.
    pub fn pending_deletions(&self) -> Vec<PendingSummary> {
        self.undo.pending()
    }

    /// Replace the view with an authoritative board.
    pub fn reconcile(&self, state: BoardState) {
        self.store.reconcile(state);
    }

    /// Replace one column's cards with an authoritative list.
    pub fn reconcile_container(&self, container_id: &str, items: Vec<Item>) -> Result<()> {
        self.store.reconcile_container(container_id, items)
    }

    /// Whether a column's keys have grown too close together.
    pub fn needs_rebalance(&self, container_id: &str) -> Result<bool> {
        let snapshot = self.snapshot();
        if snapshot.container(container_id).is_none() {
            return Err(Error::ContainerNotFound(container_id.to_string()));
        }
        Ok(position::needs_rebalance(
            &snapshot.siblings(container_id),
            self.config.min_position_gap,
        ))
    }

    /// Evenly renumber a column's cards and persist every changed key.
    ///
    /// Returns how many cards were persisted. The first gateway failure rolls
    /// the view back and is returned; cards persisted before it stay
    /// persisted until the next reconcile.
    pub async fn rebalance_container(&self, container_id: &str) -> Result<usize> {
        let (previous, changed) = self
            .store
            .renumber_container(container_id, self.config.rebalance_step)?;

        tracing::info!(container_id = %container_id, changed = changed.len(), "Rebalancing column");

        for item in &changed {
            if let Err(err) = self
                .gateway
                .reorder(&item.id, &item.container_id, item.position)
                .await
            {
                tracing::warn!(container_id = %container_id, item_id = %item.id, error = %err, "Rebalance failed, rolling back");
                self.store.install(previous);
                self.surface.show(
                    Notification::error("Failed to reorder tasks", self.config.error_duration)
                        .with_detail(err.to_string()),
                );
                return Err(err.into());
            }
        }

        Ok(changed.len())
    }

    /// Tear the board down: stop the sweep, abandon pending deletions and
    /// drop any drag in progress. Returns how many deletions were abandoned.
    pub fn shutdown(&self) -> usize {
        self.janitor.cancel();
        self.coordinator.cancel_drag();
        self.undo.shutdown()
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.janitor.cancel();
    }
}
