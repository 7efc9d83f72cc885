//! Cancellable deferred execution.
//!
//! A [`ScheduledTask`] is the only way to cancel work it started. It is not
//! `Clone`, so whoever holds the handle owns cancellation. Dropping the
//! handle detaches the task; it still runs.

use std::future::Future;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Handle to a task running on the Tokio runtime at some later point.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: AbortHandle,
    deadline: Instant,
}

impl ScheduledTask {
    /// Run `work` once, at `deadline`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn at<F>(deadline: Instant, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            work.await;
        })
        .abort_handle();

        Self { handle, deadline }
    }

    /// Run `work` once, after `delay`.
    pub fn after<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::at(Instant::now() + delay, work)
    }

    /// Run `tick` every `period`, first after one full period.
    pub fn every<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(deadline, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        })
        .abort_handle();

        Self { handle, deadline }
    }

    /// When the task is (or was) first due.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Stop the task. A task that has not started will never run; one that
    /// is running is dropped at its next suspension point.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task completed or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
