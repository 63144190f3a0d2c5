//! Self-rescheduling periodic task.
//!
//! The scheduler owns one background task that waits for either the period
//! to elapse or an explicit trigger, runs the tick, and waits again. Only one
//! tick is ever in flight, a trigger replaces the pending wait, and neither
//! an error nor a panic inside the tick stops the loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Period of the console registration tick.
pub const REGISTRATION_PERIOD: Duration = Duration::from_secs(10);

/// Handle to a running periodic task. Dropping it stops the task.
#[derive(Debug)]
pub struct RetryScheduler {
    name: &'static str,
    trigger: Arc<Notify>,
    task: JoinHandle<()>,
}

impl RetryScheduler {
    /// Spawn a task running `tick` every `period`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::spawn_with(name, move || period, tick)
    }

    /// Spawn a task running `tick` with the wait before each tick read from
    /// `period`.
    pub fn spawn_with<P, F, Fut>(name: &'static str, period: P, tick: F) -> Self
    where
        P: Fn() -> Duration + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let notified = Arc::clone(&trigger);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(period()) => {}
                    () = notified.notified() => {
                        tracing::debug!(task = name, "Tick triggered early");
                    }
                }

                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(task = name, error = %e, "Periodic tick failed");
                    }
                    Err(_) => {
                        tracing::error!(task = name, "Periodic tick panicked");
                    }
                }
            }
        });

        tracing::debug!(task = name, "Started periodic task");
        Self {
            name,
            trigger,
            task,
        }
    }

    /// Run the next tick now instead of waiting out the period. A trigger
    /// arriving while a tick runs is kept and fires right after it.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the task.
    pub fn shutdown(&self) {
        if !self.task.is_finished() {
            tracing::debug!(task = self.name, "Stopping periodic task");
        }
        self.task.abort();
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
