//! The single-threaded dispatch loop shared by both schedulers.
//!
//! Each iteration first drains every result already waiting, then blocks on
//! cancellation, the next result, or room in the task queue, in that order
//! of preference. Retries are kept in their own queue and always leave
//! before original tasks.

use std::collections::VecDeque;

use sync_core::{Error, Result, Task, TaskResult};
use telemetry::metrics;

use crate::pool::WorkerPool;

/// Pending work for one round or pass.
#[derive(Debug, Default)]
pub struct TaskQueue {
    retries: VecDeque<Task>,
    pending: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            retries: VecDeque::new(),
            pending: tasks.into_iter().collect(),
        }
    }

    pub fn push_retry(&mut self, task: Task) {
        self.retries.push_back(task);
    }

    /// Oldest retry first, then the oldest original task.
    pub fn pop_next(&mut self) -> Option<Task> {
        self.retries.pop_front().or_else(|| self.pending.pop_front())
    }

    pub fn is_empty(&self) -> bool {
        self.retries.is_empty() && self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.retries.len() + self.pending.len()
    }
}

/// Counters for one drive call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: usize,
    pub settled: usize,
    pub requeued: usize,
}

impl WorkerPool {
    /// Run `tasks` to completion.
    ///
    /// `on_settled` sees every result in arrival order and may hand back a
    /// follow-up task, which is queued as a retry. Returns once nothing is
    /// queued or in flight, or `Error::Cancelled` as soon as cancellation is
    /// observed.
    pub async fn drive<F>(&mut self, tasks: Vec<Task>, mut on_settled: F) -> Result<DispatchStats>
    where
        F: FnMut(TaskResult) -> Option<Task>,
    {
        let mut queue = TaskQueue::new(tasks);
        let mut stats = DispatchStats::default();
        let mut in_flight: usize = 0;

        let mut settle = |result: TaskResult, queue: &mut TaskQueue, stats: &mut DispatchStats| {
            stats.settled += 1;
            if let Some(retry) = on_settled(result) {
                metrics().retries_requeued.inc();
                stats.requeued += 1;
                queue.push_retry(retry);
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            while in_flight > 0 {
                match self.results.try_recv() {
                    Ok(result) => {
                        in_flight -= 1;
                        settle(result, &mut queue, &mut stats);
                    }
                    Err(_) => break,
                }
            }

            if queue.is_empty() && in_flight == 0 {
                return Ok(stats);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                received = self.results.recv(), if in_flight > 0 => {
                    let Some(result) = received else {
                        return Err(Error::internal("worker pool result channel closed"));
                    };
                    in_flight -= 1;
                    settle(result, &mut queue, &mut stats);
                }
                permit = self.tasks.reserve(), if !queue.is_empty() => {
                    let Ok(permit) = permit else {
                        return Err(Error::internal("worker pool task channel closed"));
                    };
                    if let Some(task) = queue.pop_next() {
                        permit.send(task);
                        in_flight += 1;
                        stats.dispatched += 1;
                    }
                }
            }
        }
    }
}
