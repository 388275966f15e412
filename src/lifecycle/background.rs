//! Fire-and-forget background work that shutdown waits for.
//!
//! # Responsibilities
//! - Run tasks that outlive the request which started them
//! - Keep a live count of outstanding tasks
//! - Contain panics so one bad task cannot affect the caller or its siblings
//!
//! # Design Decisions
//! - Count is incremented before the task is spawned and decremented by a
//!   drop guard, so it is exact even when the task panics
//! - Waiting for zero uses `Notify`, no polling

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Notify;

use crate::error::panic_message;
use crate::observability::metrics;

#[derive(Default)]
struct Inner {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Tracker and launcher for background tasks.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `task` on the runtime and track it until it finishes.
    ///
    /// A panic inside `task` is logged and swallowed.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(payload) = AssertUnwindSafe(task).catch_unwind().await {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "Background task panicked"
                );
            }
        });
    }

    /// Number of tasks launched and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until no task is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not lost.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for outstanding tasks, optionally bounded.
    ///
    /// Returns `Err(n)` with the number of tasks still running when the bound
    /// fired. Those tasks are not cancelled.
    pub async fn drain(&self, timeout: Option<Duration>) -> Result<(), usize> {
        match timeout {
            None => {
                self.wait_idle().await;
                Ok(())
            }
            Some(limit) => match tokio::time::timeout(limit, self.wait_idle()).await {
                Ok(()) => Ok(()),
                Err(_) => Err(self.outstanding()),
            },
        }
    }

    fn track(&self) -> TaskGuard {
        let count = self.inner.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_background_tasks(count);
        TaskGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Decrements the outstanding count when the task ends, however it ends.
struct TaskGuard {
    inner: Arc<Inner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let remaining = self.inner.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_background_tasks(remaining);
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}
