//! Registry of undoable actions.
//!
//! An explicit service object rather than ambient state: construct it once,
//! hand clones to whoever needs to register or undo, and tear it down with
//! [`ActionRegistry::clear`]. Each action carries its own expiry, independent
//! of any timer its owner runs.

use crate::{schedule::ScheduledTask, ActionId};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// What kind of entity an undoable action concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Task,
    Note,
    Column,
    Comment,
    Conversation,
    Panel,
    BulkTasks,
}

impl ActionKind {
    /// Label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Task => "Task",
            ActionKind::Note => "Note",
            ActionKind::Column => "Column",
            ActionKind::Comment => "Comment",
            ActionKind::Conversation => "Conversation",
            ActionKind::Panel => "Panel",
            ActionKind::BulkTasks => "Tasks",
        }
    }

    /// Short machine-friendly name.
    pub fn slug(&self) -> &'static str {
        match self {
            ActionKind::Task => "task",
            ActionKind::Note => "note",
            ActionKind::Column => "column",
            ActionKind::Comment => "comment",
            ActionKind::Conversation => "conversation",
            ActionKind::Panel => "panel",
            ActionKind::BulkTasks => "bulk-tasks",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Callback that reverses an action. Runs at most once and resolves to
/// whether the action was actually reversed.
pub type UndoFn = Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send + Sync>;

/// A registered action that can still be undone.
pub struct UndoableAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub description: String,
    pub created_at: Instant,
    pub expires_at: Instant,
    on_undo: UndoFn,
}

impl fmt::Debug for UndoableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoableAction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a registered action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSummary {
    pub id: ActionId,
    pub kind: ActionKind,
    pub description: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl From<&UndoableAction> for ActionSummary {
    fn from(action: &UndoableAction) -> Self {
        Self {
            id: action.id,
            kind: action.kind,
            description: action.description.clone(),
            created_at: action.created_at,
            expires_at: action.expires_at,
        }
    }
}

/// Thread-safe registry of undoable actions, shared via cheap clones.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<ActionId, UndoableAction>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action that can be undone for `ttl`.
    ///
    /// Returns the new action's ID.
    pub fn register(
        &self,
        kind: ActionKind,
        description: impl Into<String>,
        ttl: Duration,
        on_undo: UndoFn,
    ) -> ActionId {
        let id = Uuid::new_v4();
        let created_at = Instant::now();
        let action = UndoableAction {
            id,
            kind,
            description: description.into(),
            created_at,
            expires_at: created_at + ttl,
            on_undo,
        };

        tracing::debug!(action_id = %id, kind = %kind, "Undoable action registered");
        self.actions.insert(id, action);

        id
    }

    /// Undo an action.
    ///
    /// The action is removed before its callback runs, so concurrent or
    /// repeated calls run it at most once. Returns `false` if the action is
    /// unknown or expired, or if its callback could not reverse it.
    pub async fn undo(&self, id: ActionId) -> bool {
        let Some((_, action)) = self.actions.remove(&id) else {
            tracing::debug!(action_id = %id, "Undo ignored: action already resolved");
            return false;
        };

        if action.expires_at <= Instant::now() {
            tracing::debug!(action_id = %id, "Undo ignored: action expired");
            return false;
        }

        if !(action.on_undo)().await {
            tracing::warn!(action_id = %id, kind = %action.kind, "Undo callback failed");
            return false;
        }
        tracing::info!(action_id = %id, kind = %action.kind, "Action undone");
        true
    }

    /// Drop an action without running it.
    pub fn remove(&self, id: ActionId) -> bool {
        self.actions.remove(&id).is_some()
    }

    /// Look up an action.
    pub fn get(&self, id: ActionId) -> Option<ActionSummary> {
        self.actions.get(&id).map(|entry| ActionSummary::from(entry.value()))
    }

    /// Whether an action is still registered.
    pub fn contains(&self, id: ActionId) -> bool {
        self.actions.contains_key(&id)
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drop every action whose expiry has passed. Returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.actions.len();
        self.actions.retain(|_, action| action.expires_at > now);
        let removed = before.saturating_sub(self.actions.len());
        if removed > 0 {
            tracing::debug!(removed, "Expired undo actions cleaned up");
        }
        removed
    }

    /// Drop every action.
    pub fn clear(&self) {
        self.actions.clear();
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `period`.
    pub fn spawn_janitor(&self, period: Duration) -> ScheduledTask {
        let registry = self.clone();
        ScheduledTask::every(period, move || {
            let registry = registry.clone();
            async move {
                registry.cleanup_expired();
            }
        })
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.len())
            .finish()
    }
}
