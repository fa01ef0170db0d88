use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use crossbeam::channel::{self, Receiver};
use tracing::{debug, warn};

/// A unit of work the pool can run. `mark_failed` records a panic inside the
/// item so it still comes back through `wait_all`.
pub trait Dispatchable: Send + 'static {
    fn mark_failed(&mut self, reason: &str);
}

/// Completion handle for one submitted item.
pub enum TaskHandle<T> {
    /// Already ran on the submitting thread.
    Ready(T),
    Pending(Receiver<T>),
}

impl<T> TaskHandle<T> {
    /// Block until the item is back.
    pub fn wait(self) -> Result<T> {
        match self {
            TaskHandle::Ready(item) => Ok(item),
            TaskHandle::Pending(rx) => rx.recv().map_err(|_| anyhow!("worker dropped its result")),
        }
    }
}

/// Upper bound on worker threads: four per hardware thread.
pub fn max_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) * 4
}

/// Clamp a requested worker count to `1..=max_threads()`.
pub fn clamp_threads(requested: usize) -> usize {
    requested.clamp(1, max_threads())
}

/// Fixed-size worker pool. With one thread no pool is built and `submit`
/// runs the work before returning.
pub struct DispatchPool {
    pool: Option<rayon::ThreadPool>,
    size: usize,
}

impl DispatchPool {
    pub fn new(requested: usize) -> Result<Self> {
        let size = clamp_threads(requested);
        if size != requested {
            warn!("thread count {} clamped to {}", requested, size);
        }
        let pool = if size > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(size)
                    .thread_name(|i| format!("imgbench-worker-{}", i))
                    .build()
                    .map_err(|e| anyhow!("rayon pool init failed: {}", e))?,
            )
        } else {
            None
        };
        debug!("dispatch pool ready with {} thread(s)", size);
        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_inline(&self) -> bool {
        self.pool.is_none()
    }

    /// Hand `item` to a worker. Ownership comes back through the handle.
    pub fn submit<T, F>(&self, work: F, item: T) -> TaskHandle<T>
    where
        T: Dispatchable,
        F: FnOnce(&mut T) + Send + 'static,
    {
        match &self.pool {
            None => TaskHandle::Ready(execute(work, item)),
            Some(pool) => {
                let (tx, rx) = channel::bounded(1);
                pool.spawn(move || {
                    let _ = tx.send(execute(work, item));
                });
                TaskHandle::Pending(rx)
            }
        }
    }

    /// Wait for every handle, returning items in submission order.
    pub fn wait_all<T>(&self, handles: Vec<TaskHandle<T>>) -> Result<Vec<T>> {
        handles.into_iter().map(TaskHandle::wait).collect()
    }
}

fn execute<T, F>(work: F, mut item: T) -> T
where
    T: Dispatchable,
    F: FnOnce(&mut T),
{
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work(&mut item))) {
        let reason = panic_message(payload.as_ref());
        warn!("work item panicked: {}", reason);
        item.mark_failed(&format!("panic: {}", reason));
    }
    item
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
