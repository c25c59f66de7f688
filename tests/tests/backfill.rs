//! Backfill rounds driven through the real pool and processor.

use integration_tests::fixtures::{d, horizon};
use integration_tests::setup::TestContext;
use sync_core::{days_inclusive, Coin};
use worker::{BackfillScheduler, BackfillSettings, CoinPhase};

fn settings(start: &str, empty_stop: u32, max_search: u32) -> BackfillSettings {
    BackfillSettings {
        start_date: d(start),
        empty_stop_blocks: empty_stop,
        max_search_blocks: max_search,
        max_retries: 3,
        horizon: horizon(),
    }
}

#[tokio::test]
async fn test_search_walks_backward_from_yesterday() {
    let ctx = TestContext::new();
    let mut pool = ctx.pool(2, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2018-01-01", 2, 2));

    let report = scheduler
        .run(&mut pool, &[Coin::new("ghost", "gst")])
        .await
        .unwrap();

    let calls = ctx.api.calls_for("ghost");
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].from, calls[0].to), (d("2024-03-03"), d("2024-06-10")));
    assert_eq!((calls[1].from, calls[1].to), (d("2023-11-24"), d("2024-03-02")));

    let state = &report.states["ghost"];
    assert_eq!(state.phase(), CoinPhase::Done);
    assert!(!state.seen_data);
    assert_eq!(state.search_empty, 2);
    assert_eq!(state.search_end, d("2023-11-23"));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_search_budget_exhausted_after_exact_rounds() {
    let ctx = TestContext::new();
    let mut pool = ctx.pool(4, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2010-01-01", 2, 30));

    let report = scheduler
        .run(&mut pool, &[Coin::new("ghost", "gst")])
        .await
        .unwrap();

    assert_eq!(report.rounds, 30);
    assert_eq!(ctx.api.calls_for("ghost").len(), 30);
    let state = &report.states["ghost"];
    assert!(state.is_done());
    assert!(!state.seen_data);
    assert_eq!(state.search_empty, 30);
    assert!(report.active.is_empty());
    pool.shutdown().await;
}

#[tokio::test]
async fn test_empty_tail_after_history_completes() {
    let ctx = TestContext::new();
    ctx.api.with_history("oldcoin", d("2023-01-01"), d("2023-06-01"));
    let mut pool = ctx.pool(4, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2018-01-01", 2, 30));

    let report = scheduler
        .run(&mut pool, &[Coin::new("oldcoin", "old")])
        .await
        .unwrap();

    let state = &report.states["oldcoin"];
    assert!(state.is_done());
    assert!(state.seen_data);
    assert_eq!(state.consecutive_empty, 2);
    assert_eq!(ctx.store.days("oldcoin"), days_inclusive(d("2023-01-01"), d("2023-06-01")));
    assert!(report.active.is_empty(), "history ended a year before the horizon");

    // Every window the run asked for respects the size and floor limits
    for call in ctx.api.calls() {
        assert!(call.from <= call.to);
        assert!((call.to - call.from).num_days() <= 100);
        assert!(call.from >= d("2018-01-01"));
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn test_floor_ends_collecting_coin() {
    let ctx = TestContext::new();
    ctx.api.with_history("steady", d("2023-06-01"), d("2024-06-10"));
    let mut pool = ctx.pool(2, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2024-01-01", 2, 30));

    let report = scheduler
        .run(&mut pool, &[Coin::new("steady", "stdy")])
        .await
        .unwrap();

    // Second window is clamped to the floor, the third would precede it
    let calls = ctx.api.calls_for("steady");
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[1].from, calls[1].to), (d("2024-01-01"), d("2024-03-02")));
    let state = &report.states["steady"];
    assert!(state.is_done());
    assert!(state.seen_data);
    assert_eq!(state.consecutive_empty, 0);
    assert_eq!(ctx.store.days("steady"), days_inclusive(d("2024-01-01"), d("2024-06-10")));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_floor_ends_search() {
    let ctx = TestContext::new();
    let mut pool = ctx.pool(2, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2024-01-01", 2, 30));

    let report = scheduler
        .run(&mut pool, &[Coin::new("ghost", "gst")])
        .await
        .unwrap();

    let calls = ctx.api.calls_for("ghost");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].from, d("2024-01-01"));
    let state = &report.states["ghost"];
    assert!(state.is_done());
    assert_eq!(state.search_empty, 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_live_coin_reported_active() {
    let ctx = TestContext::new();
    ctx.api.with_history("bitcoin", d("2024-01-01"), d("2024-06-10"));
    ctx.api.with_history("oldcoin", d("2023-01-01"), d("2023-06-01"));
    let mut pool = ctx.pool(3, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2018-01-01", 2, 30));

    let report = scheduler
        .run(&mut pool, &[Coin::new("bitcoin", "btc"), Coin::new("oldcoin", "old")])
        .await
        .unwrap();

    assert_eq!(report.active.keys().collect::<Vec<_>>(), vec!["bitcoin"]);
    assert_eq!(report.active["bitcoin"].symbol, "btc");
    assert_eq!(ctx.store.days("bitcoin"), days_inclusive(d("2024-01-01"), d("2024-06-10")));
    assert!(report.states.values().all(|s| s.is_done()));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_missing_days_requeue_same_window() {
    let ctx = TestContext::new();
    ctx.api.with_history("bitcoin", d("2024-05-01"), d("2024-06-10"));
    ctx.store.drop_inserts(1);
    let mut pool = ctx.pool(1, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2024-01-01", 1, 30));

    let report = scheduler
        .run(&mut pool, &[Coin::new("bitcoin", "btc")])
        .await
        .unwrap();

    let calls = ctx.api.calls_for("bitcoin");
    assert_eq!((calls[0].from, calls[0].to), (calls[1].from, calls[1].to));
    assert_eq!(ctx.store.days("bitcoin"), days_inclusive(d("2024-05-01"), d("2024-06-10")));
    assert!(report.states["bitcoin"].seen_data);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_backfill_returns_error() {
    let ctx = TestContext::new();
    let mut pool = ctx.pool(2, 3);
    ctx.cancel.cancel();
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2018-01-01", 2, 30));

    let err = scheduler
        .run(&mut pool, &[Coin::new("bitcoin", "btc")])
        .await
        .unwrap_err();
    assert!(matches!(err, sync_core::Error::Cancelled));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_no_coins_is_a_noop() {
    let ctx = TestContext::new();
    let mut pool = ctx.pool(2, 3);
    let scheduler = BackfillScheduler::new(ctx.store.clone(), settings("2018-01-01", 2, 30));

    let report = scheduler.run(&mut pool, &[Coin::new("  ", "x")]).await.unwrap();
    assert!(report.states.is_empty());
    assert_eq!(report.rounds, 0);
    assert_eq!(ctx.api.call_count(), 0);
    pool.shutdown().await;
}
