//! Store - the optimistic, in-memory view of the board.
//!
//! [`BoardState`] is an immutable value. Every update builds a new state that
//! shares untouched entries with the previous one (each entry sits behind an
//! `Arc`), and [`OptimisticStore`] swaps the current `Arc<BoardState>` in one
//! step. A rollback is therefore "install the snapshot captured earlier",
//! never "undo a sequence of edits".

use crate::{
    error::Result,
    item::by_position,
    position, Container, ContainerId, Error, Item, ItemId, Position,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything needed to bring a deleted column back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSnapshot {
    /// The removed column
    pub container: Container,
    /// Its items at removal time, in order
    pub items: Vec<Item>,
}

/// Plain list form used for (de)serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardDocument {
    #[serde(default)]
    containers: Vec<Container>,
    #[serde(default)]
    items: Vec<Item>,
}

/// A point-in-time view of the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoardDocument", into = "BoardDocument")]
pub struct BoardState {
    containers: BTreeMap<ContainerId, Arc<Container>>,
    items: BTreeMap<ItemId, Arc<Item>>,
}

impl TryFrom<BoardDocument> for BoardState {
    type Error = Error;

    fn try_from(doc: BoardDocument) -> Result<Self> {
        BoardState::from_parts(doc.containers, doc.items)
    }
}

impl From<BoardState> for BoardDocument {
    fn from(state: BoardState) -> Self {
        BoardDocument {
            containers: state.containers().into_iter().cloned().collect(),
            items: state.items.values().map(|i| (**i).clone()).collect(),
        }
    }
}

impl BoardState {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board, checking that every item's container exists.
    pub fn from_parts(
        containers: impl IntoIterator<Item = Container>,
        items: impl IntoIterator<Item = Item>,
    ) -> Result<Self> {
        let containers: BTreeMap<_, _> = containers
            .into_iter()
            .map(|c| (c.id.clone(), Arc::new(c)))
            .collect();

        let mut board_items = BTreeMap::new();
        for item in items {
            if !containers.contains_key(&item.container_id) {
                return Err(Error::InvalidSnapshot(format!(
                    "item '{}' references unknown container '{}'",
                    item.id, item.container_id
                )));
            }
            if board_items.contains_key(&item.id) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate item id '{}'",
                    item.id
                )));
            }
            board_items.insert(item.id.clone(), Arc::new(item));
        }

        Ok(Self {
            containers,
            items: board_items,
        })
    }

    /// Parse a board from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON, containers in board order.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Get a container by ID.
    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.get(id).map(Arc::as_ref)
    }

    /// Get an item by ID.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id).map(Arc::as_ref)
    }

    /// Shared handle to an item, for identity comparisons.
    pub fn item_handle(&self, id: &str) -> Option<&Arc<Item>> {
        self.items.get(id)
    }

    /// Containers in board order.
    pub fn containers(&self) -> Vec<&Container> {
        let mut containers: Vec<&Container> = self.containers.values().map(Arc::as_ref).collect();
        containers.sort_by(by_position);
        containers
    }

    /// Items of a container in display order.
    pub fn siblings(&self, container_id: &str) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .items
            .values()
            .filter(|i| i.container_id == container_id)
            .map(Arc::as_ref)
            .collect();
        items.sort_by(by_position);
        items
    }

    /// Items of a container in display order, leaving out one item.
    pub fn siblings_excluding(&self, container_id: &str, excluded: &str) -> Vec<&Item> {
        let mut siblings = self.siblings(container_id);
        siblings.retain(|i| i.id != excluded);
        siblings
    }

    /// Number of items in a container.
    pub fn item_count(&self, container_id: &str) -> usize {
        self.items
            .values()
            .filter(|i| i.container_id == container_id)
            .count()
    }

    /// Total number of items on the board.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the board has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn require_container(&self, id: &str) -> Result<&Arc<Container>> {
        self.containers
            .get(id)
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))
    }

    fn require_item(&self, id: &str) -> Result<&Arc<Item>> {
        self.items
            .get(id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    /// New state with an item inserted or replaced.
    pub fn with_item(&self, item: Item) -> Result<Self> {
        self.require_container(&item.container_id)?;
        let mut next = self.clone();
        next.items.insert(item.id.clone(), Arc::new(item));
        Ok(next)
    }

    /// New state with an item placed at `container_id` / `position`.
    pub fn with_item_moved(
        &self,
        item_id: &str,
        container_id: &str,
        position: Position,
    ) -> Result<(Self, Item)> {
        self.require_container(container_id)?;
        let moved = self.require_item(item_id)?.moved_to(container_id, position);
        let next = self.with_item(moved.clone())?;
        Ok((next, moved))
    }

    /// New state without an item, plus the removed item.
    pub fn without_item(&self, item_id: &str) -> Result<(Self, Item)> {
        let removed = self.require_item(item_id)?.as_ref().clone();
        let mut next = self.clone();
        next.items.remove(item_id);
        Ok((next, removed))
    }

    /// New state without a container and its items.
    pub fn without_container(&self, container_id: &str) -> Result<(Self, ColumnSnapshot)> {
        let container = self.require_container(container_id)?.as_ref().clone();
        let items: Vec<Item> = self
            .siblings(container_id)
            .into_iter()
            .cloned()
            .collect();

        let mut next = self.clone();
        next.containers.remove(container_id);
        next.items.retain(|_, i| i.container_id != container_id);

        Ok((next, ColumnSnapshot { container, items }))
    }

    /// New state with a removed column reinstated.
    pub fn with_column(&self, snapshot: ColumnSnapshot) -> Result<Self> {
        let mut next = self.clone();
        let container_id = snapshot.container.id.clone();
        next.containers
            .insert(container_id.clone(), Arc::new(snapshot.container));
        for item in snapshot.items {
            if item.container_id != container_id {
                return Err(Error::InvalidSnapshot(format!(
                    "item '{}' does not belong to column '{}'",
                    item.id, container_id
                )));
            }
            next.items.insert(item.id.clone(), Arc::new(item));
        }
        Ok(next)
    }

    /// New state with a container placed at `position`.
    pub fn with_container_moved(
        &self,
        container_id: &str,
        position: Position,
    ) -> Result<(Self, Container)> {
        let mut moved = self.require_container(container_id)?.as_ref().clone();
        moved.position = position;
        let mut next = self.clone();
        next.containers
            .insert(moved.id.clone(), Arc::new(moved.clone()));
        Ok((next, moved))
    }

    /// New state where a container's items are replaced wholesale.
    pub fn with_container_items(&self, container_id: &str, items: Vec<Item>) -> Result<Self> {
        self.require_container(container_id)?;
        let mut next = self.clone();
        next.items.retain(|_, i| i.container_id != container_id);
        for item in items {
            if item.container_id != container_id {
                return Err(Error::InvalidSnapshot(format!(
                    "item '{}' does not belong to container '{}'",
                    item.id, container_id
                )));
            }
            next.items.insert(item.id.clone(), Arc::new(item));
        }
        Ok(next)
    }

    /// New state with a container's items evenly renumbered, plus the items
    /// whose position changed.
    pub fn with_container_renumbered(
        &self,
        container_id: &str,
        step: Position,
    ) -> Result<(Self, Vec<Item>)> {
        self.require_container(container_id)?;
        let siblings = self.siblings(container_id);
        let renumbered = position::renumber(&siblings, step);

        let mut next = self.clone();
        let mut changed = Vec::new();
        for (sibling, (_, new_position)) in siblings.iter().zip(renumbered) {
            if sibling.position != new_position {
                let moved = sibling.moved_to(container_id, new_position);
                next.items.insert(moved.id.clone(), Arc::new(moved.clone()));
                changed.push(moved);
            }
        }
        Ok((next, changed))
    }
}

/// Shared handle to the current board state.
///
/// Cloning the handle shares the same state. Observers can
/// [`subscribe`](OptimisticStore::subscribe) to be woken on every change.
#[derive(Debug, Clone)]
pub struct OptimisticStore {
    state: Arc<watch::Sender<Arc<BoardState>>>,
}

impl OptimisticStore {
    /// Create a store holding `initial`.
    pub fn new(initial: BoardState) -> Self {
        let (state, _) = watch::channel(Arc::new(initial));
        Self {
            state: Arc::new(state),
        }
    }

    /// The current state. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<BoardState> {
        self.state.borrow().clone()
    }

    /// Receive every future state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardState>> {
        self.state.subscribe()
    }

    /// Replace the current state with `snapshot`, returning what was there.
    ///
    /// Used for rollback and for reconciliation refetches.
    pub fn install(&self, snapshot: Arc<BoardState>) -> Arc<BoardState> {
        self.state.send_replace(snapshot)
    }

    /// Apply a pure update. On success the previous state is returned along
    /// with whatever the update produced; on error nothing changes.
    pub fn update<T, F>(&self, f: F) -> Result<(Arc<BoardState>, T)>
    where
        F: FnOnce(&BoardState) -> Result<(BoardState, T)>,
    {
        let mut outcome = None;
        self.state.send_if_modified(|current| match f(&**current) {
            Ok((next, value)) => {
                let previous = std::mem::replace(current, Arc::new(next));
                outcome = Some(Ok((previous, value)));
                true
            }
            Err(e) => {
                outcome = Some(Err(e));
                false
            }
        });
        outcome.unwrap_or_else(|| unreachable!("send_if_modified always runs its closure"))
    }

    /// Move an item; returns the pre-move snapshot and the moved item.
    pub fn move_item(
        &self,
        item_id: &str,
        container_id: &str,
        position: Position,
    ) -> Result<(Arc<BoardState>, Item)> {
        self.update(|s| s.with_item_moved(item_id, container_id, position))
    }

    /// Move a container; returns the pre-move snapshot and the moved container.
    pub fn move_container(
        &self,
        container_id: &str,
        position: Position,
    ) -> Result<(Arc<BoardState>, Container)> {
        self.update(|s| s.with_container_moved(container_id, position))
    }

    /// Remove an item, returning it.
    pub fn remove_item(&self, item_id: &str) -> Result<Item> {
        self.update(|s| s.without_item(item_id))
            .map(|(_, removed)| removed)
    }

    /// Put an item back exactly as it was captured.
    pub fn restore_item(&self, item: Item) -> Result<()> {
        self.update(|s| Ok((s.with_item(item)?, ()))).map(|_| ())
    }

    /// Remove a column and its items.
    pub fn remove_container(&self, container_id: &str) -> Result<ColumnSnapshot> {
        self.update(|s| s.without_container(container_id))
            .map(|(_, snapshot)| snapshot)
    }

    /// Reinstate a removed column and its items.
    pub fn restore_container(&self, snapshot: ColumnSnapshot) -> Result<()> {
        self.update(|s| Ok((s.with_column(snapshot)?, ())))
            .map(|_| ())
    }

    /// Overwrite the whole board with an authoritative refetch.
    pub fn reconcile(&self, state: BoardState) {
        tracing::debug!(items = state.len(), "Reconciling board from backing store");
        self.install(Arc::new(state));
    }

    /// Overwrite one container's items with an authoritative refetch.
    pub fn reconcile_container(&self, container_id: &str, items: Vec<Item>) -> Result<()> {
        tracing::debug!(container_id = %container_id, items = items.len(), "Reconciling container");
        self.update(|s| Ok((s.with_container_items(container_id, items)?, ())))
            .map(|_| ())
    }

    /// Renumber a container's items; returns the pre-renumber snapshot and
    /// the items that moved.
    pub fn renumber_container(
        &self,
        container_id: &str,
        step: Position,
    ) -> Result<(Arc<BoardState>, Vec<Item>)> {
        self.update(|s| s.with_container_renumbered(container_id, step))
    }
}
