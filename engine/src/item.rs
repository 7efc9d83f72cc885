//! Board entities: cards (items) and the columns (containers) that hold them.

use crate::{ContainerId, ItemId, Position};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Anything that carries a fractional ordering key among its siblings.
///
/// Implemented by [`Item`] (ordered within a container) and [`Container`]
/// (ordered on the board), so one allocator serves both.
pub trait Positioned {
    /// Identifier used to break position ties.
    fn id(&self) -> &str;
    /// Current ordering key.
    fn position(&self) -> Position;
}

impl<P: Positioned + ?Sized> Positioned for &P {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn position(&self) -> Position {
        (**self).position()
    }
}

/// Total order used everywhere siblings are sorted.
///
/// Ascending by position, ties broken by id so the order is deterministic.
pub fn by_position<P: Positioned + ?Sized>(a: &P, b: &P) -> Ordering {
    a.position()
        .total_cmp(&b.position())
        .then_with(|| a.id().cmp(b.id()))
}

/// A card on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique identifier for this item
    pub id: ItemId,
    /// Column the item currently sits in
    pub container_id: ContainerId,
    /// Fractional ordering key within the container
    pub position: Position,
    /// Opaque application data (title, assignee, ...)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Item {
    /// Create a new item.
    pub fn new(
        id: impl Into<ItemId>,
        container_id: impl Into<ContainerId>,
        position: Position,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            container_id: container_id.into(),
            position,
            payload,
        }
    }

    /// Copy of this item placed at a new container and position.
    pub fn moved_to(&self, container_id: impl Into<ContainerId>, position: Position) -> Self {
        Self {
            container_id: container_id.into(),
            position,
            ..self.clone()
        }
    }

    /// Human-readable title from the payload, if it has one.
    pub fn title(&self) -> Option<&str> {
        self.payload.get("title").and_then(|v| v.as_str())
    }
}

impl Positioned for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Position {
        self.position
    }
}

/// A column on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Unique identifier for this container
    pub id: ContainerId,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Fractional ordering key on the board
    pub position: Position,
    /// Maximum number of items allowed (work-in-progress limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<usize>,
}

impl Container {
    /// Create a container without a WIP limit.
    pub fn new(id: impl Into<ContainerId>, title: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            position,
            wip_limit: None,
        }
    }

    /// Set a WIP limit.
    pub fn with_wip_limit(mut self, limit: usize) -> Self {
        self.wip_limit = Some(limit);
        self
    }

    /// Whether one more item fits next to `current` items.
    pub fn accepts_one_more(&self, current: usize) -> bool {
        self.wip_limit.map_or(true, |limit| current < limit)
    }
}

impl Positioned for Container {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> Position {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_item() {
        let item = Item::new("card-1", "todo", 1.0, json!({"title": "Write docs"}));

        assert_eq!(item.id, "card-1");
        assert_eq!(item.container_id, "todo");
        assert_eq!(item.position, 1.0);
        assert_eq!(item.title(), Some("Write docs"));
    }

    #[test]
    fn moved_to_keeps_payload() {
        let item = Item::new("card-1", "todo", 1.0, json!({"title": "Write docs"}));
        let moved = item.moved_to("done", 0.5);

        assert_eq!(moved.container_id, "done");
        assert_eq!(moved.position, 0.5);
        assert_eq!(moved.payload, item.payload);
        // Original untouched
        assert_eq!(item.container_id, "todo");
    }

    #[test]
    fn ordering_breaks_ties_by_id() {
        let a = Item::new("a", "todo", 2.0, json!({}));
        let b = Item::new("b", "todo", 2.0, json!({}));
        let c = Item::new("c", "todo", 1.0, json!({}));

        let mut items = vec![b.clone(), a.clone(), c.clone()];
        items.sort_by(by_position);

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn wip_limit() {
        let open = Container::new("todo", "To do", 1.0);
        assert!(open.accepts_one_more(1000));

        let limited = Container::new("doing", "Doing", 2.0).with_wip_limit(2);
        assert!(limited.accepts_one_more(1));
        assert!(!limited.accepts_one_more(2));
    }

    #[test]
    fn serialization_format() {
        let item = Item::new("card-1", "todo", 1.5, json!({"title": "x"}));
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("containerId")); // camelCase

        let container = Container::new("todo", "To do", 1.0);
        let json = serde_json::to_string(&container).unwrap();
        assert!(!json.contains("wipLimit")); // omitted when unset
    }
}
