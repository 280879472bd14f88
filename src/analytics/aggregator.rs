//! Window aggregation over stored visits
//!
//! Every operation is a read over the half-open window `[start_ms, end_ms)`.
//! Nothing is precomputed: counters are recomputed from storage on each call,
//! except that an optional rollup cache may answer for days that are sealed.

use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analytics::models::{DailyStat, DayStats, DistinctField, GroupCount, GroupField, Window};
use crate::analytics::rollup::DailyRollupCache;
use crate::config::AnalyticsConfig;
use crate::storage::{Storage, StorageError, StorageResult};

/// Failure of a multi-day computation
#[derive(Debug, Error)]
pub enum TrendError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("trend computation cancelled")]
    Cancelled,
}

/// Percentage change from `yesterday` to `today`, zero-guarded
pub fn growth_rate(today: i64, yesterday: i64) -> f64 {
    if yesterday == 0 {
        return 0.0;
    }
    (today - yesterday) as f64 / yesterday as f64 * 100.0
}

pub struct VisitAggregator {
    storage: Arc<dyn Storage>,
    rollup: Option<DailyRollupCache>,
}

impl VisitAggregator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            rollup: None,
        }
    }

    pub fn with_rollup(storage: Arc<dyn Storage>, rollup: DailyRollupCache) -> Self {
        Self {
            storage,
            rollup: Some(rollup),
        }
    }

    pub fn from_config(storage: Arc<dyn Storage>, config: &AnalyticsConfig) -> Self {
        if config.rollup_cache_max_days == 0 {
            return Self::new(storage);
        }
        let rollup = DailyRollupCache::new(config.rollup_cache_max_days, config.rollup_grace_secs);
        Self::with_rollup(storage, rollup)
    }

    pub async fn count_visits(&self, window: &Window) -> StorageResult<i64> {
        self.storage.count_visits(window).await
    }

    pub async fn count_unique_visitors(&self, window: &Window) -> StorageResult<i64> {
        self.storage
            .count_distinct(DistinctField::IpAddress, window)
            .await
    }

    pub async fn count_sessions(&self, window: &Window) -> StorageResult<i64> {
        self.storage
            .count_distinct(DistinctField::SessionId, window)
            .await
    }

    pub async fn count_new_visitors(&self, window: &Window) -> StorageResult<i64> {
        self.storage.count_new_visitors(window).await
    }

    /// Visit counts per value of `field`, most visited first
    pub async fn group_by(&self, field: GroupField, window: &Window) -> StorageResult<Vec<GroupCount>> {
        self.storage.group_counts(field, window, None).await
    }

    /// Most visited URLs. The caller validates `limit`.
    pub async fn top_pages(&self, window: &Window, limit: i64) -> StorageResult<Vec<GroupCount>> {
        self.storage
            .group_counts(GroupField::Url, window, Some(limit))
            .await
    }

    /// Mean response time in milliseconds, 0 when no visit has one
    pub async fn avg_response_time(&self, window: &Window) -> StorageResult<f64> {
        Ok(self.storage.avg_response_time(window).await?.unwrap_or(0.0))
    }

    /// Share of visits answered with status >= 400, as a percentage
    pub async fn error_rate(&self, window: &Window) -> StorageResult<f64> {
        let (total, errors) = tokio::try_join!(
            self.storage.count_visits(window),
            self.storage.count_status_at_least(window, 400),
        )?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(errors as f64 / total as f64 * 100.0)
    }

    /// The four trend counters for one window, queried concurrently
    pub async fn day_stats(&self, window: &Window) -> StorageResult<DayStats> {
        let (visits, unique_visitors, sessions, new_visitors) = tokio::try_join!(
            self.count_visits(window),
            self.count_unique_visitors(window),
            self.count_sessions(window),
            self.count_new_visitors(window),
        )?;

        Ok(DayStats {
            visits,
            unique_visitors,
            sessions,
            new_visitors,
        })
    }

    /// `day_stats`, answered from the rollup cache when the window is sealed
    pub async fn day_stats_at(&self, window: &Window, now_ms: i64) -> StorageResult<DayStats> {
        let Some(rollup) = &self.rollup else {
            return self.day_stats(window).await;
        };

        if let Some(stats) = rollup.get(window, now_ms).await {
            return Ok(stats);
        }

        let stats = self.day_stats(window).await?;
        rollup.insert(*window, stats, now_ms).await;
        Ok(stats)
    }

    /// One `DayStats` per calendar day, in the order given.
    ///
    /// Days are computed one after another; the token is honoured between
    /// days and while a day is in flight.
    pub async fn trend(
        &self,
        days: &[(NaiveDate, Window)],
        now_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyStat>, TrendError> {
        let mut daily = Vec::with_capacity(days.len());

        for (date, window) in days {
            let stats = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(computed = daily.len(), total = days.len(), "trend cancelled");
                    return Err(TrendError::Cancelled);
                }
                stats = self.day_stats_at(window, now_ms) => stats?,
            };

            daily.push(DailyStat {
                date: date.format("%Y-%m-%d").to_string(),
                stats,
            });
        }

        Ok(daily)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceType, NewVisit};
    use crate::storage::SqliteStorage;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const DAY0: i64 = 1_760_400_000_000 - 1_760_400_000_000 % DAY_MS;

    async fn setup_sqlite() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    struct Seed<'a> {
        ip: &'a str,
        url: &'a str,
        device: DeviceType,
        browser: Option<&'a str>,
        is_new: bool,
        at: i64,
    }

    async fn seed(storage: &Arc<dyn Storage>, seed: Seed<'_>) -> i64 {
        storage
            .insert_visit(&NewVisit {
                user_id: None,
                ip_address: seed.ip.to_string(),
                url: seed.url.to_string(),
                http_method: Some("GET".to_string()),
                user_agent: None,
                referer: None,
                traffic_source: None,
                page_stay_time_sec: None,
                session_id: format!("{}_{}", seed.ip, seed.at),
                device_type: seed.device,
                operating_system: None,
                browser: seed.browser.map(str::to_string),
                is_new_visitor: seed.is_new,
                visit_time: seed.at,
            })
            .await
            .unwrap()
    }

    fn visit<'a>(ip: &'a str, url: &'a str, at: i64) -> Seed<'a> {
        Seed {
            ip,
            url,
            device: DeviceType::Desktop,
            browser: Some("Chrome"),
            is_new: false,
            at,
        }
    }

    #[test]
    fn test_growth_rate() {
        assert_eq!(growth_rate(15, 10), 50.0);
        assert_eq!(growth_rate(5, 10), -50.0);
        assert_eq!(growth_rate(7, 0), 0.0);
        assert_eq!(growth_rate(0, 0), 0.0);
    }

    #[tokio::test]
    async fn test_counts_respect_half_open_window() {
        let storage = setup_sqlite().await;
        seed(&storage, visit("10.0.0.1", "/", DAY0)).await;
        seed(&storage, visit("10.0.0.1", "/", DAY0 + 10)).await;
        seed(&storage, visit("10.0.0.2", "/", DAY0 + DAY_MS - 1)).await;
        // Starts the next day
        seed(&storage, visit("10.0.0.3", "/", DAY0 + DAY_MS)).await;

        let aggregator = VisitAggregator::new(storage);
        let day = Window::new(DAY0, DAY0 + DAY_MS);

        assert_eq!(aggregator.count_visits(&day).await.unwrap(), 3);
        assert_eq!(aggregator.count_unique_visitors(&day).await.unwrap(), 2);
        assert_eq!(aggregator.count_sessions(&day).await.unwrap(), 3);
        assert!(
            aggregator.count_unique_visitors(&day).await.unwrap()
                <= aggregator.count_visits(&day).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_new_visitors_counts_flagged_rows() {
        let storage = setup_sqlite().await;
        seed(&storage, Seed { is_new: true, ..visit("10.0.0.1", "/", DAY0) }).await;
        seed(&storage, visit("10.0.0.1", "/", DAY0 + 1)).await;
        seed(&storage, Seed { is_new: true, ..visit("10.0.0.2", "/", DAY0 + 2) }).await;

        let aggregator = VisitAggregator::new(storage);
        let day = Window::new(DAY0, DAY0 + DAY_MS);
        assert_eq!(aggregator.count_new_visitors(&day).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_group_by_orders_by_count_then_name() {
        let storage = setup_sqlite().await;
        for (i, browser) in ["Firefox", "Chrome", "Chrome", "Safari", "Firefox", "Chrome"]
            .into_iter()
            .enumerate()
        {
            seed(
                &storage,
                Seed {
                    browser: Some(browser),
                    ..visit("10.0.0.1", "/", DAY0 + i as i64)
                },
            )
            .await;
        }
        seed(&storage, Seed { browser: None, ..visit("10.0.0.9", "/", DAY0 + 50) }).await;

        let aggregator = VisitAggregator::new(storage);
        let groups = aggregator
            .group_by(GroupField::Browser, &Window::new(DAY0, DAY0 + DAY_MS))
            .await
            .unwrap();

        let flat: Vec<(Option<&str>, i64)> = groups
            .iter()
            .map(|g| (g.dimension.as_deref(), g.visit_count))
            .collect();
        assert_eq!(
            flat,
            vec![
                (Some("Chrome"), 3),
                (Some("Firefox"), 2),
                (Some("Safari"), 1),
                (None, 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_group_by_device_type() {
        let storage = setup_sqlite().await;
        seed(&storage, Seed { device: DeviceType::Mobile, ..visit("10.0.0.1", "/", DAY0) }).await;
        seed(&storage, Seed { device: DeviceType::Mobile, ..visit("10.0.0.2", "/", DAY0 + 1) }).await;
        seed(&storage, Seed { device: DeviceType::Tablet, ..visit("10.0.0.3", "/", DAY0 + 2) }).await;

        let aggregator = VisitAggregator::new(storage);
        let groups = aggregator
            .group_by(GroupField::DeviceType, &Window::new(DAY0, DAY0 + DAY_MS))
            .await
            .unwrap();

        assert_eq!(groups[0].dimension.as_deref(), Some("mobile"));
        assert_eq!(groups[0].visit_count, 2);
        assert_eq!(groups[1].dimension.as_deref(), Some("tablet"));
    }

    #[tokio::test]
    async fn test_top_pages_truncates_and_is_non_increasing() {
        let storage = setup_sqlite().await;
        let mut at = DAY0;
        for (url, hits) in [("/a", 5), ("/b", 1), ("/c", 4), ("/d", 2), ("/e", 3), ("/f", 6), ("/g", 1)] {
            for _ in 0..hits {
                seed(&storage, visit("10.0.0.1", url, at)).await;
                at += 1;
            }
        }

        let aggregator = VisitAggregator::new(storage);
        let pages = aggregator
            .top_pages(&Window::new(DAY0, DAY0 + DAY_MS), 5)
            .await
            .unwrap();

        assert_eq!(pages.len(), 5);
        assert!(pages.windows(2).all(|w| w[0].visit_count >= w[1].visit_count));
        assert_eq!(pages[0].dimension.as_deref(), Some("/f"));
    }

    #[tokio::test]
    async fn test_performance_on_empty_window() {
        let aggregator = VisitAggregator::new(setup_sqlite().await);
        let window = Window::new(DAY0, DAY0 + DAY_MS);

        assert_eq!(aggregator.avg_response_time(&window).await.unwrap(), 0.0);
        assert_eq!(aggregator.error_rate(&window).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_error_rate_and_avg_response_time() {
        let storage = setup_sqlite().await;
        let ok = seed(&storage, visit("10.0.0.1", "/", DAY0)).await;
        let missing = seed(&storage, visit("10.0.0.1", "/gone", DAY0 + 1)).await;
        let failed = seed(&storage, visit("10.0.0.1", "/boom", DAY0 + 2)).await;
        // Never patched: counts as a visit but has no response time
        seed(&storage, visit("10.0.0.1", "/", DAY0 + 3)).await;

        storage.patch_response(ok, 200, 10).await.unwrap();
        storage.patch_response(missing, 404, 20).await.unwrap();
        storage.patch_response(failed, 500, 60).await.unwrap();

        let aggregator = VisitAggregator::new(storage);
        let window = Window::new(DAY0, DAY0 + DAY_MS);

        assert_eq!(aggregator.avg_response_time(&window).await.unwrap(), 30.0);
        assert_eq!(aggregator.error_rate(&window).await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn test_trend_is_oldest_first() {
        let storage = setup_sqlite().await;
        seed(&storage, visit("10.0.0.1", "/", DAY0 + 5)).await;
        seed(&storage, visit("10.0.0.1", "/", DAY0 + DAY_MS + 5)).await;
        seed(&storage, visit("10.0.0.2", "/", DAY0 + DAY_MS + 6)).await;

        let aggregator = VisitAggregator::new(storage);
        let first = NaiveDate::from_ymd_opt(2025, 10, 14).unwrap();
        let days = vec![
            (first, Window::new(DAY0, DAY0 + DAY_MS)),
            (first.succ_opt().unwrap(), Window::new(DAY0 + DAY_MS, DAY0 + 2 * DAY_MS)),
        ];

        let trend = aggregator
            .trend(&days, DAY0 + 2 * DAY_MS, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, "2025-10-14");
        assert_eq!(trend[0].stats.visits, 1);
        assert_eq!(trend[1].date, "2025-10-15");
        assert_eq!(trend[1].stats.visits, 2);
        assert_eq!(trend[1].stats.unique_visitors, 2);
    }

    #[tokio::test]
    async fn test_trend_honours_cancellation() {
        let aggregator = VisitAggregator::new(setup_sqlite().await);
        let token = CancellationToken::new();
        token.cancel();

        let days = vec![(
            NaiveDate::from_ymd_opt(2025, 10, 14).unwrap(),
            Window::new(DAY0, DAY0 + DAY_MS),
        )];
        let result = aggregator.trend(&days, DAY0, &token).await;
        assert!(matches!(result, Err(TrendError::Cancelled)));
    }

    #[tokio::test]
    async fn test_rollup_matches_full_recompute_for_sealed_days() {
        let storage = setup_sqlite().await;
        seed(&storage, visit("10.0.0.1", "/", DAY0 + 5)).await;
        seed(&storage, visit("10.0.0.2", "/", DAY0 + 6)).await;

        let cached = VisitAggregator::with_rollup(Arc::clone(&storage), DailyRollupCache::new(10, 300));
        let plain = VisitAggregator::new(Arc::clone(&storage));
        let day = Window::new(DAY0, DAY0 + DAY_MS);
        let now = DAY0 + 2 * DAY_MS;

        let first = cached.day_stats_at(&day, now).await.unwrap();
        let second = cached.day_stats_at(&day, now).await.unwrap();
        assert_eq!(first, plain.day_stats(&day).await.unwrap());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rollup_skips_open_day() {
        let storage = setup_sqlite().await;
        let cached = VisitAggregator::with_rollup(Arc::clone(&storage), DailyRollupCache::new(10, 300));
        let today = Window::new(DAY0, DAY0 + DAY_MS);
        let now = DAY0 + 1_000;

        assert_eq!(cached.day_stats_at(&today, now).await.unwrap().visits, 0);
        seed(&storage, visit("10.0.0.1", "/", DAY0 + 500)).await;
        assert_eq!(cached.day_stats_at(&today, now).await.unwrap().visits, 1);
    }
}
