//! Parameter Sync Policy
//!
//! Effects may finish building their parameter tree some time after they are
//! instantiated. Discovery is therefore deferred by a fixed settle interval
//! after each successful load. The interval is a heuristic: a tree that shows
//! up later stays invisible until the next load.

use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

/// When parameter discovery runs relative to effect instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub interval: Duration,
}

impl SettlePolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

/// Single-slot deferred task runner
///
/// Holds at most one pending task. Scheduling a new one aborts the previous,
/// so a stale refresh from an earlier load never fires. The runtime is shut
/// down without blocking, so the scheduler may be dropped from async code.
pub struct RefreshScheduler {
    runtime: Option<Runtime>,
    pending: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("isolator-settle")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            pending: None,
        })
    }

    /// Run `task` after `delay`, replacing any pending task
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        if let Some(runtime) = &self.runtime {
            self.pending = Some(runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            }));
        }
    }

    /// Abort the pending task, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                debug!("cancelling pending parameter refresh");
            }
            handle.abort();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_task_runs_after_delay() {
        let mut scheduler = RefreshScheduler::new().unwrap();
        let (tx, rx) = unbounded();
        scheduler.schedule(Duration::from_millis(10), move || {
            let _ = tx.send(1);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(1));
    }

    #[test]
    fn test_reschedule_cancels_previous() {
        let mut scheduler = RefreshScheduler::new().unwrap();
        let (tx, rx) = unbounded();
        let first = tx.clone();
        scheduler.schedule(Duration::from_millis(200), move || {
            let _ = first.send("stale");
        });
        scheduler.schedule(Duration::from_millis(10), move || {
            let _ = tx.send("fresh");
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok("fresh"));
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_drop_inside_async_context() {
        let outer = Builder::new_current_thread().build().unwrap();
        outer.block_on(async {
            let mut scheduler = RefreshScheduler::new().unwrap();
            scheduler.schedule(Duration::from_secs(10), || {});
            drop(scheduler);
        });
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = RefreshScheduler::new().unwrap();
        let (tx, rx) = unbounded::<()>();
        scheduler.schedule(Duration::from_millis(50), move || {
            let _ = tx.send(());
        });
        assert!(scheduler.has_pending());
        scheduler.cancel();
        assert!(!scheduler.has_pending());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
