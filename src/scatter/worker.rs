//! Fixed-size worker pool over a `crossbeam-channel` task queue.
//!
//! Tasks are queued up front; each worker pulls until the queue is empty
//! and sends every outcome back on a result channel, so no work is ever
//! fire-and-forget. The pool size is independent of the task count.

use std::thread;

use crossbeam_channel::unbounded;
use tracing::debug;

use crate::error::{CoaError, Result};

/// A pool of `size` scoped worker threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// Creates a pool of `size` workers.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CoaError::invalid("worker pool needs at least one worker"));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `work` over every task and returns the outcomes in task order.
    ///
    /// At most `min(size, tasks.len())` threads are started. Threads are
    /// scoped, so `work` may borrow from the caller. A panicking task
    /// propagates its panic to the caller.
    ///
    /// # Examples
    ///
    /// ```
    /// use u_crayfish::scatter::WorkerPool;
    ///
    /// let pool = WorkerPool::new(2).unwrap();
    /// let squares = pool.execute(vec![1, 2, 3, 4], |_, x| x * x).unwrap();
    /// assert_eq!(squares, vec![1, 4, 9, 16]);
    /// ```
    pub fn execute<T, R, F>(&self, tasks: Vec<T>, work: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T) -> R + Sync,
    {
        let count = tasks.len();
        let (task_tx, task_rx) = unbounded();
        for task in tasks.into_iter().enumerate() {
            // The receiver is alive, so this cannot fail.
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let (result_tx, result_rx) = unbounded();
        let workers = self.size.min(count);
        let work = &work;

        thread::scope(|scope| -> Result<()> {
            for id in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                thread::Builder::new()
                    .name(format!("crayfish-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        debug!(worker = id, "worker started");
                        for (index, task) in task_rx.iter() {
                            if result_tx.send((index, work(index, task))).is_err() {
                                break;
                            }
                        }
                        debug!(worker = id, "worker finished");
                    })
                    .map_err(|e| CoaError::Unavailable(format!("failed to spawn worker: {e}")))?;
            }
            Ok(())
        })?;
        drop(result_tx);

        let mut slots: Vec<Option<R>> = (0..count).map(|_| None).collect();
        for (index, outcome) in result_rx.iter() {
            slots[index] = Some(outcome);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| CoaError::Unavailable(format!("task {index} produced no outcome")))
            })
            .collect()
    }
}
