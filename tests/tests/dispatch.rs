//! Retry priority and flow control of the dispatch loop.

use std::sync::Arc;

use async_trait::async_trait;
use integration_tests::fixtures::{backfill_task, d, horizon};
use integration_tests::setup::TestContext;
use parking_lot::Mutex;
use sync_core::{Coin, Task, TaskResult};
use tokio_util::sync::CancellationToken;
use worker::{BackfillScheduler, BackfillSettings, PoolConfig, TaskHandler, WorkerPool};

/// Single-slot pool: one worker, one queued task, one buffered result.
fn tight() -> PoolConfig {
    PoolConfig {
        workers: 1,
        task_capacity: 1,
        result_capacity: 1,
    }
}

/// Records handled tasks; the first attempt of `gap_coin` reports three
/// missing days.
struct Recorder {
    gap_coin: &'static str,
    seen: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl TaskHandler for Recorder {
    async fn handle(&self, task: Task) -> TaskResult {
        self.seen.lock().push((task.coin_id.clone(), task.retry));
        let missing = if task.coin_id == self.gap_coin && task.retry == 0 {
            vec![task.to, task.to, task.to]
        } else {
            Vec::new()
        };
        TaskResult::written(task, 3, 3, missing, false)
    }
}

#[tokio::test]
async fn test_gap_retry_runs_before_pending_originals() {
    let recorder = Arc::new(Recorder {
        gap_coin: "alpha",
        seen: Mutex::new(Vec::new()),
    });
    let mut pool = WorkerPool::start(tight(), recorder.clone(), CancellationToken::new());

    let tasks: Vec<Task> = ["alpha", "bravo", "charlie", "delta"]
        .iter()
        .map(|id| backfill_task(id, "2024-06-08", "2024-06-10"))
        .collect();

    let mut requeued = Vec::new();
    let stats = pool
        .drive(tasks, |result| {
            if result.has_gap() && result.task.retry < 3 {
                requeued.push((result.missing_dates.len(), result.task.retry + 1));
                Some(result.task.next_retry())
            } else {
                None
            }
        })
        .await
        .unwrap();

    assert_eq!(requeued, vec![(3, 1)]);
    assert_eq!(stats.dispatched, 5);
    assert_eq!(stats.requeued, 1);

    let seen = recorder.seen.lock().clone();
    let retry_at = seen.iter().position(|s| *s == ("alpha".to_string(), 1)).unwrap();
    let charlie_at = seen.iter().position(|s| s.0 == "charlie").unwrap();
    assert!(retry_at < charlie_at, "retry must precede pending originals: {:?}", seen);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_backfill_retry_precedes_later_coins() {
    let ctx = TestContext::new();
    for id in ["alpha", "bravo", "charlie"] {
        ctx.api.with_history(id, d("2024-06-08"), d("2024-06-10"));
    }
    // The first insert is alpha's and does not show up in the verify read
    ctx.store.drop_inserts(1);
    let mut pool = ctx.pool_with(tight(), 3);

    let settings = BackfillSettings {
        start_date: d("2024-01-01"),
        empty_stop_blocks: 1,
        max_search_blocks: 30,
        max_retries: 3,
        horizon: horizon(),
    };
    let coins = [Coin::new("alpha", "a"), Coin::new("bravo", "b"), Coin::new("charlie", "c")];
    let report = BackfillScheduler::new(ctx.store.clone(), settings)
        .run(&mut pool, &coins)
        .await
        .unwrap();

    let order = ctx.api.fetch_order();
    let second_alpha = order
        .iter()
        .enumerate()
        .filter(|(_, id)| *id == "alpha")
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    let first_charlie = order.iter().position(|id| id == "charlie").unwrap();
    assert!(second_alpha < first_charlie, "fetch order: {:?}", order);

    assert_eq!(ctx.store.days("alpha").len(), 3);
    assert!(report.states.values().all(|s| s.is_done() && s.seen_data));
    assert_eq!(report.active.len(), 3);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_many_tasks_through_small_queues() {
    let recorder = Arc::new(Recorder {
        gap_coin: "none",
        seen: Mutex::new(Vec::new()),
    });
    let mut pool = WorkerPool::start(PoolConfig::new(2), recorder.clone(), CancellationToken::new());

    let tasks: Vec<Task> = (0..500)
        .map(|i| backfill_task(&format!("coin{}", i), "2024-06-01", "2024-06-10"))
        .collect();
    let mut settled = 0;
    let stats = pool
        .drive(tasks, |_| {
            settled += 1;
            None
        })
        .await
        .unwrap();

    assert_eq!(settled, 500);
    assert_eq!(stats.dispatched, 500);
    assert_eq!(recorder.seen.lock().len(), 500);
    pool.shutdown().await;
}
