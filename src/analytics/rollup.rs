//! Cache of per-day counters for days that can no longer change.
//!
//! `visit_time` is stamped at ingestion, so once a day window has ended (plus
//! a grace period for requests that were in flight at midnight) no new row can
//! land in it. Counters for such windows are cached; the current day and any
//! window still inside the grace period always go to storage.

use moka::future::Cache;

use crate::analytics::models::{DayStats, Window};

pub struct DailyRollupCache {
    cache: Cache<Window, DayStats>,
    grace_ms: i64,
}

impl DailyRollupCache {
    pub fn new(max_days: u64, grace_secs: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_days).build();
        let grace_ms = i64::try_from(grace_secs.saturating_mul(1000)).unwrap_or(i64::MAX);

        Self { cache, grace_ms }
    }

    /// Whether a window is closed for good at `now_ms`
    pub fn is_sealed(&self, window: &Window, now_ms: i64) -> bool {
        window.end_ms.saturating_add(self.grace_ms) <= now_ms
    }

    pub async fn get(&self, window: &Window, now_ms: i64) -> Option<DayStats> {
        if !self.is_sealed(window, now_ms) {
            return None;
        }
        self.cache.get(window).await
    }

    /// Store counters for a window; ignored while the window can still grow
    pub async fn insert(&self, window: Window, stats: DayStats, now_ms: i64) {
        if self.is_sealed(&window, now_ms) {
            self.cache.insert(window, stats).await;
        }
    }
}
