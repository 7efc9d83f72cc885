//! Notification surface contract.
//!
//! The engine never renders anything. It hands [`Notification`]s to a
//! [`NotificationSurface`] supplied by the application; an undoable
//! notification carries an [`UndoHandle`] the UI invokes from its undo control.

use crate::{registry::ActionRegistry, ActionId};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Undo control attached to a notification.
#[derive(Clone)]
pub struct UndoHandle {
    action_id: ActionId,
    registry: ActionRegistry,
}

impl UndoHandle {
    pub(crate) fn new(action_id: ActionId, registry: ActionRegistry) -> Self {
        Self {
            action_id,
            registry,
        }
    }

    /// The undoable action this control refers to.
    pub fn action_id(&self) -> ActionId {
        self.action_id
    }

    /// Run the undo. Returns `false` when the action already resolved
    /// (committed, undone, expired or dismissed); stale controls are harmless.
    pub async fn invoke(&self) -> bool {
        self.registry.undo(self.action_id).await
    }
}

impl fmt::Debug for UndoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoHandle")
            .field("action_id", &self.action_id)
            .finish()
    }
}

/// A transient message for the user.
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub detail: Option<String>,
    pub severity: Severity,
    pub duration: Duration,
    pub undo: Option<UndoHandle>,
}

impl Notification {
    /// Informational message.
    pub fn info(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            message: message.into(),
            detail: None,
            severity: Severity::Info,
            duration,
            undo: None,
        }
    }

    /// Error message.
    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::info(message, duration)
        }
    }

    /// Attach a secondary line.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach an undo control.
    pub fn with_undo(mut self, handle: UndoHandle) -> Self {
        self.undo = Some(handle);
        self
    }
}

/// Where notifications go.
pub trait NotificationSurface: Send + Sync {
    fn show(&self, notification: Notification);
}

/// Forwards notifications into a channel; the receiving end renders them.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSurface {
    /// Create a surface and the receiver its notifications arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSurface for ChannelSurface {
    fn show(&self, notification: Notification) {
        // Receiver gone means nobody is rendering; nothing to do.
        let _ = self.sender.send(notification);
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSurface;

impl NotificationSurface for TracingSurface {
    fn show(&self, notification: Notification) {
        let undo = notification.undo.as_ref().map(|h| h.action_id().to_string());
        match notification.severity {
            Severity::Info => tracing::info!(
                detail = ?notification.detail,
                duration_ms = notification.duration.as_millis() as u64,
                undo = ?undo,
                "{}",
                notification.message
            ),
            Severity::Error => tracing::warn!(
                detail = ?notification.detail,
                duration_ms = notification.duration.as_millis() as u64,
                "{}",
                notification.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        let n = Notification::error("Delete failed", Duration::from_secs(5))
            .with_detail("The item could not be deleted");

        assert_eq!(n.severity, Severity::Error);
        assert_eq!(n.message, "Delete failed");
        assert_eq!(n.detail.as_deref(), Some("The item could not be deleted"));
        assert!(n.undo.is_none());
    }

    #[test]
    fn channel_surface_forwards() {
        let (surface, mut rx) = ChannelSurface::new();
        surface.show(Notification::info("Task restored", Duration::from_secs(3)));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.message, "Task restored");
        assert_eq!(received.severity, Severity::Info);
    }

    #[test]
    fn channel_surface_tolerates_closed_receiver() {
        let (surface, rx) = ChannelSurface::new();
        drop(rx);
        surface.show(Notification::info("nobody listening", Duration::from_secs(1)));
    }
}
