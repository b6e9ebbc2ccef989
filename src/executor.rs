//! Execution contexts for dispatching calls and delivering callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tokio::runtime::Handle;

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks, on the calling thread or elsewhere.
///
/// An executor that drops a task without running it does not break a call:
/// the call then fails with an unexpected error.
pub trait Executor: Send + Sync {
    /// Runs `task`, now or later.
    fn execute(&self, task: Task);
}

/// Runs every task inline, on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynchronousExecutor;

impl Executor for SynchronousExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Runs tasks on a Tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Uses the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        drop(self.handle.spawn_blocking(task));
    }
}

/// Runs each task on a new named thread (`restbind-0`, `restbind-1`, ...).
#[derive(Debug, Default)]
pub struct ThreadExecutor {
    next_id: AtomicUsize,
}

impl ThreadExecutor {
    /// Creates an executor.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("restbind-{id}"))
            .spawn(task);
        if let Err(e) = spawned {
            // The task was dropped with the failed spawn.
            tracing::error!(error = %e, "Failed to spawn executor thread");
        }
    }
}
