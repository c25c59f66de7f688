//! Fixed-size worker pool over bounded task and result channels.

use std::sync::Arc;

use sync_core::{Task, TaskResult};
use telemetry::metrics;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::processor::TaskHandler;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub task_capacity: usize,
    pub result_capacity: usize,
}

impl PoolConfig {
    /// Task queue holds twice the worker count, result queue four times.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            task_capacity: workers * 2,
            result_capacity: workers * 4,
        }
    }
}

/// N workers, each turning one task into exactly one result.
///
/// The pool outlives a single round or pass; both schedulers drive it in
/// turn through `WorkerPool::drive`.
pub struct WorkerPool {
    pub(crate) tasks: mpsc::Sender<Task>,
    pub(crate) results: mpsc::Receiver<TaskResult>,
    pub(crate) cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    config: PoolConfig,
}

impl WorkerPool {
    /// Spawn the workers.
    pub fn start(config: PoolConfig, handler: Arc<dyn TaskHandler>, cancel: CancellationToken) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<Task>(config.task_capacity.max(1));
        let (result_tx, result_rx) = mpsc::channel::<TaskResult>(config.result_capacity.max(1));
        let task_rx = Arc::new(Mutex::new(task_rx));

        let handles = (0..config.workers)
            .map(|worker_id| {
                let handler = handler.clone();
                let tasks = task_rx.clone();
                let results = result_tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    run_worker(worker_id, handler, tasks, results, cancel).await;
                })
            })
            .collect();

        info!(
            workers = config.workers,
            task_capacity = config.task_capacity,
            result_capacity = config.result_capacity,
            "Worker pool started"
        );

        Self {
            tasks: task_tx,
            results: result_rx,
            cancel,
            handles,
            config,
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Close the task queue and wait for every worker to return.
    pub async fn shutdown(self) {
        let Self {
            tasks,
            results,
            handles,
            ..
        } = self;
        drop(tasks);
        // Workers blocked on a full result queue must not wait on us
        drop(results);
        for handle in handles {
            let _ = handle.await;
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    handler: Arc<dyn TaskHandler>,
    tasks: Arc<Mutex<mpsc::Receiver<Task>>>,
    results: mpsc::Sender<TaskResult>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = tasks.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = next else {
            break;
        };

        metrics().tasks_in_flight.inc();
        let result = handler.handle(task).await;
        metrics().tasks_in_flight.dec();

        tokio::select! {
            biased;
            sent = results.send(result) => {
                if sent.is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    debug!(worker = worker_id, "Worker exiting");
}
