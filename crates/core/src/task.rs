//! Window tasks and their results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dates::WINDOW_DAYS;

/// Which scheduler produced a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Backfill,
    Incremental,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backfill => f.write_str("backfill"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// One inclusive date window to fetch for one coin.
///
/// Tasks are values: they cross the worker queue by move and are only ever
/// replaced by a copy with a higher retry count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub coin_id: String,
    pub symbol: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub retry: u32,
    pub phase: TaskPhase,
}

impl Task {
    pub fn new(
        coin_id: impl Into<String>,
        symbol: impl Into<String>,
        from: NaiveDate,
        to: NaiveDate,
        phase: TaskPhase,
    ) -> Self {
        debug_assert!(from <= to, "window starts after it ends");
        Self {
            coin_id: coin_id.into(),
            symbol: symbol.into(),
            from,
            to,
            retry: 0,
            phase,
        }
    }

    /// Copy of this task with the retry count bumped by one.
    pub fn next_retry(&self) -> Self {
        Self {
            retry: self.retry + 1,
            ..self.clone()
        }
    }

    /// Inclusive length of the window in days.
    pub fn span_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// Window ordering and size invariants.
    pub fn is_well_formed(&self) -> bool {
        self.from <= self.to && (self.to - self.from).num_days() <= WINDOW_DAYS
    }
}

/// Outcome of processing one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: Task,
    /// Rows written by this attempt.
    pub inserted: usize,
    /// Distinct days the API returned for the window.
    pub api_days: usize,
    /// True when the window produced nothing usable.
    pub empty: bool,
    pub http_status: u16,
    pub error: Option<String>,
    /// Aggregated days still absent from the store after insert, ascending.
    pub missing_dates: Vec<NaiveDate>,
    pub active_now: bool,
    /// True when the fast path found the window fully stored.
    pub skipped: bool,
}

impl TaskResult {
    fn base(task: Task) -> Self {
        Self {
            task,
            inserted: 0,
            api_days: 0,
            empty: false,
            http_status: 200,
            error: None,
            missing_dates: Vec::new(),
            active_now: false,
            skipped: false,
        }
    }

    /// Window already fully present; nothing was fetched.
    pub fn skipped(task: Task) -> Self {
        Self {
            skipped: true,
            ..Self::base(task)
        }
    }

    /// Fetch failed permanently or ran out of attempts.
    pub fn fetch_failed(task: Task, http_status: u16, error: impl Into<String>) -> Self {
        Self {
            empty: true,
            http_status,
            error: Some(error.into()),
            ..Self::base(task)
        }
    }

    /// Fetch succeeded but no day had any sample.
    pub fn no_data(task: Task) -> Self {
        Self {
            empty: true,
            ..Self::base(task)
        }
    }

    /// Storage rejected the batch; nothing counts as inserted.
    pub fn storage_failed(task: Task, api_days: usize, error: impl Into<String>) -> Self {
        Self {
            api_days,
            error: Some(error.into()),
            ..Self::base(task)
        }
    }

    /// Insert went through; `missing_dates` comes from the verify query.
    pub fn written(
        task: Task,
        inserted: usize,
        api_days: usize,
        missing_dates: Vec<NaiveDate>,
        active_now: bool,
    ) -> Self {
        Self {
            inserted,
            api_days,
            missing_dates,
            active_now,
            ..Self::base(task)
        }
    }

    /// The window yielded real data: no error, not empty, at least one day.
    pub fn has_data(&self) -> bool {
        self.error.is_none() && !self.empty && self.api_days > 0
    }

    /// Post-insert verification found days the store does not report yet.
    pub fn has_gap(&self) -> bool {
        !self.missing_dates.is_empty()
    }
}
