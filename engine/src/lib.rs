//! # Kanban Engine
//!
//! An optimistic mutation engine for drag-and-drop task boards.
//!
//! Moves and deletes are applied to the local view immediately and committed
//! to a backing store in the background. A refused move is rolled back to the
//! exact pre-drop state; a delete waits out a grace period during which it
//! can be undone.
//!
//! ## Design Principles
//!
//! - **Optimistic**: the view changes before the network answers
//! - **Immutable state**: every update builds a new [`BoardState`], so rollback
//!   is reinstalling a snapshot
//! - **No IO of its own**: persistence goes through [`MutationGateway`],
//!   presentation through [`NotificationSurface`]
//!
//! ## Core Concepts
//!
//! ### Positions
//!
//! Cards and columns are ordered by fractional keys. [`position::allocate`]
//! picks a key between two neighbours without touching any other sibling,
//! and reports [`Error::PositionGapExhausted`] once `f64` precision runs out.
//!
//! ### Store
//!
//! [`OptimisticStore`] holds the current `Arc<BoardState>`. Observers
//! subscribe to changes; the gateway's view is merged back through
//! reconciliation.
//!
//! ### Reordering
//!
//! [`ReorderCoordinator`] runs the drag state machine
//! (`Idle → Dragging → Dropped → Committing → Idle`).
//!
//! ### Undoable deletes
//!
//! [`UndoQueue`] schedules each delete's commit behind a cancellable timer and
//! registers an undo action in an [`ActionRegistry`].
//!
//! ## Quick Start
//!
//! ```rust
//! use kanban_engine::{
//!     Board, BoardState, Container, DropTarget, EngineConfig, InMemoryGateway, Item,
//!     TracingSurface,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let state = BoardState::from_parts(
//!     vec![Container::new("todo", "To do", 1.0)],
//!     vec![
//!         Item::new("a", "todo", 1.0, json!({"title": "Write docs"})),
//!         Item::new("b", "todo", 2.0, json!({"title": "Ship"})),
//!     ],
//! )
//! .unwrap();
//!
//! let gateway = Arc::new(InMemoryGateway::new(state.clone()));
//! let board = Board::new(state, gateway, Arc::new(TracingSurface), EngineConfig::default());
//!
//! // Move "b" in front of "a"
//! let outcome = board.move_item("b", DropTarget::Sibling("a".into())).await.unwrap();
//! assert!(outcome.is_committed());
//!
//! // Delete "a", then change our mind
//! let ticket = board.delete_item("a", None).unwrap();
//! assert!(board.snapshot().item("a").is_none());
//! assert!(board.undo(ticket.action_id).await);
//! assert!(board.snapshot().item("a").is_some());
//! # }
//! ```

pub mod board;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod item;
pub mod memory;
pub mod notify;
pub mod position;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod undo;

// Re-export main types at crate root
pub use board::Board;
pub use config::{ConfigError, EngineConfig};
pub use coordinator::{DragState, DropOutcome, DropTarget, ReorderCoordinator};
pub use error::{Error, ErrorCategory, GatewayError, Result};
pub use gateway::{GatewayResult, MutationGateway};
pub use item::{Container, Item, Positioned};
pub use memory::{GatewayCall, InMemoryGateway};
pub use notify::{
    ChannelSurface, Notification, NotificationSurface, Severity, TracingSurface, UndoHandle,
};
pub use registry::{ActionKind, ActionRegistry, ActionSummary};
pub use schedule::ScheduledTask;
pub use store::{BoardState, ColumnSnapshot, OptimisticStore};
pub use undo::{
    DeleteRequest, DeletionKey, DeletionPhase, DeletionTicket, PendingSummary, UndoQueue,
};

/// Type aliases for clarity
pub type ItemId = String;
pub type ContainerId = String;
pub type Position = f64;
pub type ActionId = uuid::Uuid;
