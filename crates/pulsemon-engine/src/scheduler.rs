//! Recurring-task scheduling on the shared tokio worker pool.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long shutdown waits for in-flight task bodies to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs each registered task on its own recurring tick. Tasks are
/// independent entries on the shared pool; one slow task never delays
/// another's schedule, and a task is single-flight with respect to itself:
/// the next tick is not started until the previous body has completed.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Registers a recurring task. The first execution happens immediately;
    /// later ones are spaced `every` after the previous completion.
    pub fn schedule<F, Fut>(&self, every: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        if self.shut_down.load(Ordering::SeqCst) {
            tracing::warn!("Scheduler is shut down, task not registered");
            return;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut tick = interval(every);
            // Re-schedule only after the previous run completed; a slow run
            // must not cause a burst of catch-up executions.
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => task().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        self.handles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(handle);
    }

    /// Cancels all future executions and waits briefly for in-flight ones.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();

        for handle in handles {
            if timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("Scheduled task did not finish within the shutdown grace period");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
