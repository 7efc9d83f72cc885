//! Deferred, cancellable soft-delete.
//!
//! A deletion is applied to the view immediately and committed to the backing
//! store only after a grace period. Until then an undo control can cancel the
//! commit and put the item back.
//!
//! # Lifecycle
//!
//! ```text
//! delete_item ──► Pending ──(ttl elapses)──► Committing ──► commit ok   ──► gone
//!                    │                            └──────► commit fails ──► restored
//!                    └──(undo)──► restored
//! ```
//!
//! Each deletion owns one timer and one registry action. Undo removes the
//! action before running it, and a fired timer moves the entry to
//! `Committing` under the same map lock undo takes, so a deletion is either
//! restored or committed, never both.
//!
//! A restore can fail, e.g. when the card's column was deleted meanwhile. The
//! undo then reports `false`, an error notification is shown and the deletion
//! stays scheduled, so the backing store ends up agreeing with the view.

use crate::{
    config::EngineConfig,
    error::GatewayError,
    notify::{Notification, NotificationSurface, UndoHandle},
    registry::{ActionKind, ActionRegistry},
    schedule::ScheduledTask,
    ActionId, Error,
};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Unique key of a pending deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeletionKey(String);

impl DeletionKey {
    fn generate(kind: ActionKind) -> Self {
        Self(format!("{}-{}", kind.slug(), Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeletionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type CommitFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), GatewayError>> + Send + Sync>;
type RestoreFn = Box<dyn FnOnce() -> Result<(), Error> + Send + Sync>;

/// A deletion request.
///
/// `kind`, the item snapshot and the commit are required; everything else is
/// optional and set through the builder methods.
pub struct DeleteRequest<T> {
    kind: ActionKind,
    item: T,
    commit: CommitFn,
    label: Option<String>,
    ttl: Option<Duration>,
    on_optimistic_remove: Option<Box<dyn FnOnce() + Send>>,
    on_restore: Option<Box<dyn FnOnce(T) -> Result<(), Error> + Send + Sync>>,
}

impl<T: Send + Sync + 'static> DeleteRequest<T> {
    /// Delete `item` of `kind`, persisting with `commit` once the grace
    /// period is over.
    pub fn new<F, Fut>(kind: ActionKind, item: T, commit: F) -> Self
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
    {
        Self {
            kind,
            item,
            commit: Box::new(move || commit().boxed()),
            label: None,
            ttl: None,
            on_optimistic_remove: None,
            on_restore: None,
        }
    }

    /// Name shown in the notification, e.g. the card title.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Grace period; defaults to the queue's configured TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Called synchronously, before anything else, to hide the item.
    pub fn on_optimistic_remove(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_optimistic_remove = Some(Box::new(f));
        self
    }

    /// Called with the snapshot when the deletion is undone or fails.
    ///
    /// An `Err` means the item could not be put back.
    pub fn on_restore(
        mut self,
        f: impl FnOnce(T) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.on_restore = Some(Box::new(f));
        self
    }
}

/// Identifies a deletion once it is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionTicket {
    pub key: DeletionKey,
    pub action_id: ActionId,
}

/// Where a pending deletion is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPhase {
    /// Waiting for the grace period; can be undone.
    Pending,
    /// Commit in flight; can no longer be undone.
    Committing,
}

/// Read-only view of a pending deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    pub key: DeletionKey,
    pub action_id: ActionId,
    pub kind: ActionKind,
    pub description: String,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub phase: DeletionPhase,
}

struct PendingDeletion {
    action_id: ActionId,
    kind: ActionKind,
    description: String,
    created_at: Instant,
    expires_at: Instant,
    phase: DeletionPhase,
    timer: Option<ScheduledTask>,
    commit: Option<CommitFn>,
    restore: Option<RestoreFn>,
}

impl PendingDeletion {
    fn summary(&self, key: &DeletionKey) -> PendingSummary {
        PendingSummary {
            key: key.clone(),
            action_id: self.action_id,
            kind: self.kind,
            description: self.description.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            phase: self.phase,
        }
    }
}

struct Inner {
    registry: ActionRegistry,
    pending: DashMap<DeletionKey, PendingDeletion>,
    surface: Arc<dyn NotificationSurface>,
    config: EngineConfig,
}

/// Queue of deletions waiting out their grace period.
///
/// Cheap to clone; clones share the same queue. Construct once per board and
/// call [`shutdown`](UndoQueue::shutdown) when the board goes away.
#[derive(Clone)]
pub struct UndoQueue {
    inner: Arc<Inner>,
}

impl UndoQueue {
    /// Create a queue that reports to `surface`.
    pub fn new(surface: Arc<dyn NotificationSurface>, config: EngineConfig) -> Self {
        Self::with_registry(ActionRegistry::new(), surface, config)
    }

    /// Create a queue that registers its actions in an existing registry.
    pub fn with_registry(
        registry: ActionRegistry,
        surface: Arc<dyn NotificationSurface>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                pending: DashMap::new(),
                surface,
                config,
            }),
        }
    }

    /// The registry undo actions are kept in.
    pub fn registry(&self) -> &ActionRegistry {
        &self.inner.registry
    }

    /// Queue a deletion.
    ///
    /// Hides the item right away, shows an undoable notification and schedules
    /// the commit. Must be called from within a Tokio runtime.
    pub fn delete_item<T: Send + Sync + 'static>(&self, request: DeleteRequest<T>) -> DeletionTicket {
        let DeleteRequest {
            kind,
            item,
            commit,
            label,
            ttl,
            on_optimistic_remove,
            on_restore,
        } = request;

        let inner = &self.inner;
        let ttl = ttl.unwrap_or(inner.config.undo_ttl);
        let key = DeletionKey::generate(kind);

        if let Some(remove) = on_optimistic_remove {
            remove();
        }

        let description = match &label {
            Some(label) => format!("{} \"{}\" deleted", kind.label(), label),
            None => format!("{} deleted", kind.label()),
        };

        let restore: RestoreFn = match on_restore {
            Some(on_restore) => Box::new(move || on_restore(item)),
            None => Box::new(move || {
                drop(item);
                Ok(())
            }),
        };

        let weak = Arc::downgrade(inner);
        let undo_key = key.clone();
        let action_id = inner.registry.register(
            kind,
            description.clone(),
            ttl,
            Box::new(move || {
                async move {
                    match weak.upgrade() {
                        Some(inner) => Inner::cancel(&inner, &undo_key),
                        None => false,
                    }
                }
                .boxed()
            }),
        );

        let created_at = Instant::now();
        let expires_at = created_at + ttl;
        inner.pending.insert(
            key.clone(),
            PendingDeletion {
                action_id,
                kind,
                description: description.clone(),
                created_at,
                expires_at,
                phase: DeletionPhase::Pending,
                timer: None,
                commit: Some(commit),
                restore: Some(restore),
            },
        );

        inner.surface.show(
            Notification::info(description, ttl)
                .with_undo(UndoHandle::new(action_id, inner.registry.clone())),
        );

        Inner::arm(inner, &key, expires_at);

        tracing::info!(key = %key, action_id = %action_id, kind = %kind, ttl_ms = ttl.as_millis() as u64, "Deletion scheduled");

        DeletionTicket { key, action_id }
    }

    /// Undo a deletion by its action ID.
    ///
    /// Returns `false` (and does nothing) if the deletion already committed,
    /// was already undone, or its undo window closed.
    pub async fn undo(&self, action_id: ActionId) -> bool {
        self.inner.registry.undo(action_id).await
    }

    /// The notification was dismissed: drop the undo control but keep the
    /// deletion scheduled.
    pub fn dismiss(&self, action_id: ActionId) -> bool {
        self.inner.registry.remove(action_id)
    }

    /// Snapshot of every deletion not yet resolved.
    pub fn pending(&self) -> Vec<PendingSummary> {
        let mut pending: Vec<_> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.value().summary(entry.key()))
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    /// Number of deletions not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether a deletion is still unresolved.
    pub fn is_pending(&self, key: &DeletionKey) -> bool {
        self.inner.pending.contains_key(key)
    }

    /// Start sweeping expired registry actions periodically.
    pub fn spawn_janitor(&self) -> ScheduledTask {
        self.inner
            .registry
            .spawn_janitor(self.inner.config.cleanup_interval)
    }

    /// Tear the queue down.
    ///
    /// Every deletion still waiting out its grace period is cancelled without
    /// committing or restoring, and the registry is cleared. Commits already
    /// in flight finish on their own. Returns how many deletions were
    /// abandoned.
    pub fn shutdown(&self) -> usize {
        let inner = &self.inner;
        let mut abandoned = 0;
        inner.pending.retain(|key, entry| {
            if entry.phase != DeletionPhase::Pending {
                return true;
            }
            if let Some(timer) = &entry.timer {
                timer.cancel();
            }
            tracing::debug!(key = %key, "Pending deletion abandoned at shutdown");
            abandoned += 1;
            false
        });
        inner.registry.clear();

        tracing::info!(abandoned, "Undo queue shut down");
        abandoned
    }
}

impl fmt::Debug for UndoQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoQueue")
            .field("pending", &self.inner.pending.len())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl Inner {
    /// Start the commit timer of an entry already in `pending`.
    fn arm(inner: &Arc<Inner>, key: &DeletionKey, at: Instant) {
        let fire_inner = inner.clone();
        let fire_key = key.clone();
        let timer = ScheduledTask::at(at, async move {
            Inner::fire(&fire_inner, &fire_key).await;
        });

        match inner.pending.get_mut(key) {
            Some(mut entry) if entry.phase == DeletionPhase::Pending => entry.timer = Some(timer),
            // Undone (or already firing) before the handle could be stored.
            Some(_) => {}
            None => timer.cancel(),
        }
    }

    /// Undo path: cancel the timer and restore, if still pending.
    fn cancel(inner: &Arc<Inner>, key: &DeletionKey) -> bool {
        // The timer is aborted while the entry is still present and its shard
        // locked; a timer that already fired has moved the entry to
        // Committing and is left alone.
        let removed = inner.pending.remove_if(key, |_, entry| {
            if entry.phase != DeletionPhase::Pending {
                return false;
            }
            if let Some(timer) = &entry.timer {
                timer.cancel();
            }
            true
        });

        let Some((key, mut entry)) = removed else {
            tracing::debug!(key = %key, "Undo ignored: deletion already committing");
            return false;
        };

        let restored = match entry.restore.take() {
            Some(restore) => restore(),
            None => Ok(()),
        };

        match restored {
            Ok(()) => {
                tracing::info!(key = %key, action_id = %entry.action_id, "Deletion undone");
                inner.surface.show(Notification::info(
                    format!("{} restored", entry.kind.label()),
                    inner.config.info_duration,
                ));
                true
            }
            Err(err) => {
                tracing::warn!(key = %key, action_id = %entry.action_id, error = %err, "Undo failed, deletion stays scheduled");
                inner.surface.show(
                    Notification::error("Failed to undo", inner.config.error_duration)
                        .with_detail(format!("The action could not be undone: {err}")),
                );
                // Still hidden, so let the commit go ahead at its original time.
                let expires_at = entry.expires_at;
                inner.pending.insert(key.clone(), entry);
                Inner::arm(inner, &key, expires_at);
                false
            }
        }
    }

    /// Timer path: commit, restoring on failure.
    async fn fire(inner: &Arc<Inner>, key: &DeletionKey) {
        let claimed = match inner.pending.get_mut(key) {
            Some(mut entry) if entry.phase == DeletionPhase::Pending => {
                entry.phase = DeletionPhase::Committing;
                // Nobody may abort the task that is now running the commit.
                entry.timer = None;
                entry.commit.take().map(|commit| (entry.action_id, commit))
            }
            _ => None,
        };

        let Some((action_id, commit)) = claimed else {
            return;
        };

        // The undo window is over.
        inner.registry.remove(action_id);

        tracing::debug!(key = %key, "Committing deletion");
        let result = commit().await;

        let Some((_, mut entry)) = inner.pending.remove(key) else {
            return;
        };

        match result {
            Ok(()) => {
                tracing::info!(key = %key, "Deletion committed");
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Deletion commit failed, restoring");
                if let Some(restore) = entry.restore.take() {
                    if let Err(restore_err) = restore() {
                        tracing::warn!(key = %key, error = %restore_err, "Could not restore after failed commit");
                    }
                }
                inner.surface.show(
                    Notification::error("Delete failed", inner.config.error_duration)
                        .with_detail(format!("The item could not be deleted: {err}")),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelSurface, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    struct Tracker {
        commits: Arc<AtomicUsize>,
        restored: Arc<Mutex<Vec<String>>>,
        removed: Arc<AtomicUsize>,
    }

    impl Tracker {
        fn new() -> Self {
            Self {
                commits: Arc::new(AtomicUsize::new(0)),
                restored: Arc::new(Mutex::new(Vec::new())),
                removed: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn request(&self, item: &str, outcome: Result<(), GatewayError>) -> DeleteRequest<String> {
            let commits = self.commits.clone();
            let restored = self.restored.clone();
            let removed = self.removed.clone();
            DeleteRequest::new(ActionKind::Task, item.to_string(), move || async move {
                commits.fetch_add(1, Ordering::SeqCst);
                outcome
            })
            .label(item)
            .on_optimistic_remove(move || {
                removed.fetch_add(1, Ordering::SeqCst);
            })
            .on_restore(move |item| {
                restored.lock().unwrap().push(item);
                Ok(())
            })
        }

        fn commits(&self) -> usize {
            self.commits.load(Ordering::SeqCst)
        }

        fn restored(&self) -> Vec<String> {
            self.restored.lock().unwrap().clone()
        }
    }

    fn test_queue() -> (UndoQueue, mpsc::UnboundedReceiver<Notification>) {
        let (surface, rx) = ChannelSurface::new();
        (UndoQueue::new(Arc::new(surface), EngineConfig::default()), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn removes_optimistically_and_notifies() {
        let (queue, mut rx) = test_queue();
        let tracker = Tracker::new();

        let ticket = queue.delete_item(tracker.request("Write docs", Ok(())));

        assert_eq!(tracker.removed.load(Ordering::SeqCst), 1);
        assert!(queue.is_pending(&ticket.key));
        assert!(ticket.key.as_str().starts_with("task-"));

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.message, "Task \"Write docs\" deleted");
        assert_eq!(notice.duration, Duration::from_secs(10));
        assert_eq!(notice.undo.unwrap().action_id(), ticket.action_id);
    }

    #[tokio::test(start_paused = true)]
    async fn message_without_label() {
        let (queue, mut rx) = test_queue();
        let request = DeleteRequest::new(ActionKind::BulkTasks, (), || async { Ok(()) });

        queue.delete_item(request);
        assert_eq!(rx.try_recv().unwrap().message, "Tasks deleted");
    }

    #[tokio::test(start_paused = true)]
    async fn commits_after_ttl() {
        let (queue, _rx) = test_queue();
        let tracker = Tracker::new();

        let ticket = queue.delete_item(tracker.request("a", Ok(())));

        sleep(Duration::from_millis(9_999)).await;
        assert_eq!(tracker.commits(), 0);

        sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.commits(), 1);
        assert!(!queue.is_pending(&ticket.key));
        assert!(!queue.registry().contains(ticket.action_id));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(tracker.commits(), 1);
        assert!(tracker.restored().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn undo_before_ttl_restores_once() {
        let (queue, mut rx) = test_queue();
        let tracker = Tracker::new();

        let ticket = queue.delete_item(tracker.request("a", Ok(())));
        let _deleted_notice = rx.try_recv().unwrap();

        sleep(Duration::from_secs(5)).await;
        assert!(queue.undo(ticket.action_id).await);
        assert!(!queue.undo(ticket.action_id).await);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(tracker.commits(), 0);
        assert_eq!(tracker.restored(), vec!["a".to_string()]);
        assert_eq!(queue.pending_count(), 0);

        let restored_notice = rx.try_recv().unwrap();
        assert_eq!(restored_notice.message, "Task restored");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn undo_through_notification_handle() {
        let (queue, mut rx) = test_queue();
        let tracker = Tracker::new();

        queue.delete_item(tracker.request("a", Ok(())));
        let handle = rx.try_recv().unwrap().undo.unwrap();

        assert!(handle.invoke().await);
        assert!(!handle.invoke().await);
        assert_eq!(tracker.restored().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_after_commit_is_noop() {
        let (queue, _rx) = test_queue();
        let tracker = Tracker::new();

        let ticket = queue.delete_item(tracker.request("a", Ok(())));
        sleep(Duration::from_secs(11)).await;

        assert!(!queue.undo(ticket.action_id).await);
        assert_eq!(tracker.commits(), 1);
        assert!(tracker.restored().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_restores_and_notifies() {
        let (queue, mut rx) = test_queue();
        let tracker = Tracker::new();

        let ticket = queue.delete_item(
            tracker.request("a", Err(GatewayError::Network("offline".into()))),
        );
        let _deleted_notice = rx.try_recv().unwrap();

        sleep(Duration::from_secs(11)).await;

        assert_eq!(tracker.commits(), 1);
        assert_eq!(tracker.restored(), vec!["a".to_string()]);
        assert!(!queue.is_pending(&ticket.key));

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(notice.message, "Delete failed");

        // Not retried
        sleep(Duration::from_secs(60)).await;
        assert_eq!(tracker.commits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deletions_are_independent() {
        let (queue, _rx) = test_queue();
        let first = Tracker::new();
        let second = Tracker::new();

        let t1 = queue.delete_item(first.request("one", Ok(())));
        let t2 = queue.delete_item(second.request("two", Ok(())).ttl(Duration::from_secs(4)));
        assert_ne!(t1.key, t2.key);

        assert!(queue.undo(t1.action_id).await);
        let remaining = queue.pending();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, t2.key);
        assert_eq!(remaining[0].phase, DeletionPhase::Pending);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(second.commits(), 1);
        assert!(second.restored().is_empty());
        assert_eq!(first.commits(), 0);
        assert_eq!(first.restored(), vec!["one".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_keeps_deletion_scheduled() {
        let (queue, _rx) = test_queue();
        let tracker = Tracker::new();

        let ticket = queue.delete_item(tracker.request("a", Ok(())));
        assert!(queue.dismiss(ticket.action_id));
        assert!(!queue.undo(ticket.action_id).await);

        sleep(Duration::from_secs(11)).await;
        assert_eq!(tracker.commits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_during_commit_is_refused() {
        let (queue, _rx) = test_queue();
        let restored = Arc::new(AtomicUsize::new(0));
        let counter = restored.clone();

        let request = DeleteRequest::new(ActionKind::Note, (), || async {
            sleep(Duration::from_secs(3)).await;
            Ok(())
        })
        .ttl(Duration::from_secs(1))
        .on_restore(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let ticket = queue.delete_item(request);

        sleep(Duration::from_millis(1_500)).await;
        let pending = queue.pending();
        assert_eq!(pending[0].phase, DeletionPhase::Committing);
        assert!(!queue.undo(ticket.action_id).await);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(restored.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_pending() {
        let (queue, _rx) = test_queue();
        let tracker = Tracker::new();

        queue.delete_item(tracker.request("a", Ok(())));
        queue.delete_item(tracker.request("b", Ok(())));

        assert_eq!(queue.shutdown(), 2);
        assert!(queue.registry().is_empty());

        sleep(Duration::from_secs(30)).await;
        assert_eq!(tracker.commits(), 0);
        assert!(tracker.restored().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restore_reports_and_keeps_deletion_scheduled() {
        let (queue, mut rx) = test_queue();
        let commits = Arc::new(AtomicUsize::new(0));
        let counter = commits.clone();

        let request = DeleteRequest::new(ActionKind::Task, (), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .on_restore(|_| Err(Error::ContainerNotFound("todo".into())));
        let ticket = queue.delete_item(request);
        let _deleted_notice = rx.try_recv().unwrap();

        sleep(Duration::from_secs(2)).await;
        assert!(!queue.undo(ticket.action_id).await);

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(notice.message, "Failed to undo");
        assert!(rx.try_recv().is_err());

        assert!(queue.is_pending(&ticket.key));
        assert!(!queue.undo(ticket.action_id).await);

        sleep(Duration::from_millis(7_900)).await;
        assert_eq!(commits.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending_count(), 0);
    }
}
