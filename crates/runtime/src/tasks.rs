//! Named background tasks.
//!
//! A registry of running tasks keyed by an opaque tag. At most one task runs
//! per tag; `restart` atomically replaces the incumbent. Cancellation is
//! cooperative: the task body races its future against a cancellation token,
//! so a cancel is observed at the body's next suspension point.
//!
//! The registry lock is only ever held for map operations. Anything that
//! waits — for a prior task to acknowledge cancellation, for completion —
//! happens outside the lock, so a cancelled task that re-enters the service
//! while winding down cannot deadlock it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use mur_domain::error::{Error, Result};

struct TaskEntry {
    generation: u64,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct Registry {
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

/// Handle to a started task.
#[derive(Debug)]
pub struct TaskHandle {
    pub tag: String,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl TaskHandle {
    /// Signal cooperative cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the task has terminated (completed, failed, or cancelled).
    pub async fn wait(mut self) {
        await_done(&mut self.done).await;
    }
}

async fn await_done(done: &mut watch::Receiver<bool>) {
    while !*done.borrow() {
        // A closed channel means the task already finished.
        if done.changed().await.is_err() {
            break;
        }
    }
}

/// Process-wide registry of named, cancelable background tasks.
#[derive(Default)]
pub struct BackgroundTaskService {
    registry: Arc<Registry>,
    next_generation: AtomicU64,
}

enum Install<F> {
    Spawned(TaskHandle),
    /// The tag is held; the caller gets its future back to retry with.
    Busy {
        fut: F,
        cancel: CancellationToken,
        done: watch::Receiver<bool>,
    },
}

impl BackgroundTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live task is registered under `tag`.
    pub fn is_running(&self, tag: &str) -> bool {
        self.registry
            .tasks
            .lock()
            .get(tag)
            .is_some_and(|entry| !*entry.done.borrow())
    }

    /// Start a task under `tag`. Fails with [`Error::AlreadyRunning`] when a
    /// live task already holds the tag.
    pub fn start<F>(&self, fut: F, tag: &str) -> Result<TaskHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.try_install(fut, tag) {
            Install::Spawned(handle) => Ok(handle),
            Install::Busy { .. } => Err(Error::AlreadyRunning(tag.to_owned())),
        }
    }

    /// Start a task under `tag`, cancelling and awaiting the termination of
    /// any incumbent first. There is no instant at which two tasks share the
    /// tag.
    pub async fn restart<F>(&self, fut: F, tag: &str) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut fut = fut;
        loop {
            match self.try_install(fut, tag) {
                Install::Spawned(handle) => return handle,
                Install::Busy {
                    fut: returned,
                    cancel,
                    mut done,
                } => {
                    cancel.cancel();
                    await_done(&mut done).await;
                    fut = returned;
                }
            }
        }
    }

    /// Signal cancellation for `tag` and wait for the task to terminate.
    /// Idempotent; returns whether a task existed.
    pub async fn cancel(&self, tag: &str, reason: &str) -> bool {
        let incumbent = {
            let tasks = self.registry.tasks.lock();
            tasks
                .get(tag)
                .map(|entry| (entry.cancel.clone(), entry.done.clone()))
        };
        match incumbent {
            Some((cancel, mut done)) => {
                tracing::info!(tag, reason, "cancelling background task");
                cancel.cancel();
                await_done(&mut done).await;
                true
            }
            None => false,
        }
    }

    /// Cancel every registered task and wait for all of them to terminate.
    pub async fn cancel_all(&self, reason: &str) {
        let incumbents: Vec<(String, CancellationToken, watch::Receiver<bool>)> = {
            let tasks = self.registry.tasks.lock();
            tasks
                .iter()
                .map(|(tag, entry)| (tag.clone(), entry.cancel.clone(), entry.done.clone()))
                .collect()
        };
        for (tag, cancel, _) in &incumbents {
            tracing::info!(tag, reason, "cancelling background task");
            cancel.cancel();
        }
        for (_, _, mut done) in incumbents {
            await_done(&mut done).await;
        }
    }

    /// Install and spawn a task for `tag` if the tag is free; otherwise
    /// report the incumbent. The insert happens under the registry lock so
    /// two concurrent installs cannot both win.
    fn try_install<F>(&self, fut: F, tag: &str) -> Install<F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.registry.tasks.lock();
        if let Some(entry) = tasks.get(tag) {
            if !*entry.done.borrow() {
                return Install::Busy {
                    fut,
                    cancel: entry.cancel.clone(),
                    done: entry.done.clone(),
                };
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        // Install the entry before spawning: the wrapper's cleanup takes the
        // same lock we hold, so it cannot observe a pre-insert window.
        tasks.insert(
            tag.to_owned(),
            TaskEntry {
                generation,
                cancel: cancel.clone(),
                done: done_rx.clone(),
            },
        );

        let registry = Arc::clone(&self.registry);
        let token = cancel.clone();
        let task_tag = tag.to_owned();
        let span = tracing::debug_span!("background_task", tag = %tag);
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("task observed cancellation");
                    }
                    _ = fut => {}
                }
                // Remove our own entry only — a successor under the same tag
                // carries a newer generation.
                {
                    let mut tasks = registry.tasks.lock();
                    if tasks
                        .get(&task_tag)
                        .is_some_and(|entry| entry.generation == generation)
                    {
                        tasks.remove(&task_tag);
                    }
                }
                let _ = done_tx.send(true);
            }
            .instrument(span),
        );

        Install::Spawned(TaskHandle {
            tag: tag.to_owned(),
            cancel,
            done: done_rx,
        })
    }
}
