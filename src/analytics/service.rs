//! Read-side query service
//!
//! Turns calendar requests (today, this week, the last N days, a date range)
//! into windows, validates caller input before touching storage, and bounds
//! every computation with the configured query timeout.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analytics::aggregator::{growth_rate, TrendError, VisitAggregator};
use crate::analytics::models::{
    DatedCount, GroupCount, GroupField, PerformanceStats, RealtimeStats, TrendStats, VisitOverview,
    VisitPage, Window,
};
use crate::config::AnalyticsConfig;
use crate::cursor::{create_cursor, verify_cursor, CursorData};
use crate::storage::{Storage, StorageError, StorageResult};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
pub const MAX_TREND_DAYS: i64 = 365;
pub const MAX_PAGE_LIMIT: i64 = 100;
/// Range used when a request gives no start date
pub const DEFAULT_RANGE_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("{0}")]
    Validation(String),
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] StorageError),
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    #[error("query cancelled")]
    Cancelled,
}

impl From<TrendError> for StatsError {
    fn from(err: TrendError) -> Self {
        match err {
            TrendError::Storage(e) => StatsError::Unavailable(e),
            TrendError::Cancelled => StatsError::Cancelled,
        }
    }
}

pub type StatsResult<T> = Result<T, StatsError>;

/// Optional calendar bounds; `end_date` is inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }
}

pub struct StatsService {
    storage: Arc<dyn Storage>,
    aggregator: VisitAggregator,
    offset: FixedOffset,
    query_timeout: Duration,
}

impl StatsService {
    pub fn new(storage: Arc<dyn Storage>, config: &AnalyticsConfig) -> Self {
        let aggregator = VisitAggregator::from_config(Arc::clone(&storage), config);
        Self::with_aggregator(storage, aggregator, config)
    }

    pub fn with_aggregator(
        storage: Arc<dyn Storage>,
        aggregator: VisitAggregator,
        config: &AnalyticsConfig,
    ) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| {
                warn!(
                    "UTC offset of {} minutes is out of range, using UTC",
                    config.utc_offset_minutes
                );
                Utc.fix()
            });

        Self {
            storage,
            aggregator,
            offset,
            query_timeout: Duration::from_secs(config.query_timeout_secs.max(1)),
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> StatsResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StatsError::DeadlineExceeded),
        }
    }

    /// Calendar date containing `ts_ms` in the configured offset
    pub fn local_date(&self, ts_ms: i64) -> NaiveDate {
        DateTime::from_timestamp_millis(ts_ms)
            .unwrap_or_default()
            .with_timezone(&self.offset)
            .date_naive()
    }

    /// Epoch milliseconds of local midnight starting `date`
    pub fn day_start_ms(&self, date: NaiveDate) -> i64 {
        let offset_ms = i64::from(self.offset.local_minus_utc()) * 1000;
        date.and_time(NaiveTime::MIN).and_utc().timestamp_millis() - offset_ms
    }

    pub fn day_window(&self, date: NaiveDate) -> Window {
        let start = self.day_start_ms(date);
        Window::new(start, start + DAY_MS)
    }

    /// Resolve a date range to a window.
    ///
    /// Only an explicit start after an explicit end is rejected. A range left
    /// inverted by a defaulted bound resolves to an empty window.
    pub fn range_window(&self, range: &DateRange, now_ms: i64) -> StatsResult<Window> {
        if let (Some(start), Some(end)) = (range.start_date, range.end_date) {
            if start > end {
                return Err(StatsError::Validation(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        let start_ms = match range.start_date {
            Some(date) => self.day_start_ms(date),
            None => Window::last_days(now_ms, DEFAULT_RANGE_DAYS).start_ms,
        };
        let end_ms = match range.end_date {
            Some(date) => self.day_start_ms(date) + DAY_MS,
            // Include a visit stamped in this very millisecond
            None => now_ms + 1,
        };

        Ok(Window::new(start_ms, end_ms.max(start_ms)))
    }

    pub async fn overview(&self) -> StatsResult<VisitOverview> {
        self.overview_at(Utc::now().timestamp_millis()).await
    }

    pub async fn overview_at(&self, now_ms: i64) -> StatsResult<VisitOverview> {
        let today = self.local_date(now_ms);
        let yesterday = today - ChronoDuration::days(1);
        let week_start = today - ChronoDuration::days(i64::from(today.weekday().num_days_from_monday()));
        let month_start = today - ChronoDuration::days(i64::from(today.day0()));

        let today_window = self.day_window(today);
        let yesterday_window = self.day_window(yesterday);
        let week_window = Window::new(self.day_start_ms(week_start), today_window.end_ms);
        let month_window = Window::new(self.day_start_ms(month_start), today_window.end_ms);

        let agg = &self.aggregator;
        let (today_stats, yesterday_stats, week_visits, week_unique, month_visits, month_unique) =
            self.bounded(async {
                tokio::try_join!(
                    agg.day_stats(&today_window),
                    agg.day_stats_at(&yesterday_window, now_ms),
                    agg.count_visits(&week_window),
                    agg.count_unique_visitors(&week_window),
                    agg.count_visits(&month_window),
                    agg.count_unique_visitors(&month_window),
                )
            })
            .await?;

        Ok(VisitOverview {
            today_visits: today_stats.visits,
            today_unique_visitors: today_stats.unique_visitors,
            today_sessions: today_stats.sessions,
            today_new_visitors: today_stats.new_visitors,
            yesterday_visits: yesterday_stats.visits,
            yesterday_unique_visitors: yesterday_stats.unique_visitors,
            week_visits,
            week_unique_visitors: week_unique,
            month_visits,
            month_unique_visitors: month_unique,
            visit_growth_rate: growth_rate(today_stats.visits, yesterday_stats.visits),
            visitor_growth_rate: growth_rate(
                today_stats.unique_visitors,
                yesterday_stats.unique_visitors,
            ),
        })
    }

    pub async fn trend(&self, days: i64) -> StatsResult<TrendStats> {
        self.trend_with_cancel(days, &CancellationToken::new()).await
    }

    pub async fn trend_with_cancel(
        &self,
        days: i64,
        cancel: &CancellationToken,
    ) -> StatsResult<TrendStats> {
        self.trend_at(days, Utc::now().timestamp_millis(), cancel)
            .await
    }

    /// Per-day series over the `days` calendar days ending today, oldest first
    pub async fn trend_at(
        &self,
        days: i64,
        now_ms: i64,
        cancel: &CancellationToken,
    ) -> StatsResult<TrendStats> {
        if !(1..=MAX_TREND_DAYS).contains(&days) {
            return Err(StatsError::Validation(format!(
                "days must be between 1 and {}",
                MAX_TREND_DAYS
            )));
        }

        let today = self.local_date(now_ms);
        let calendar: Vec<(NaiveDate, Window)> = (0..days)
            .rev()
            .map(|back| {
                let date = today - ChronoDuration::days(back);
                (date, self.day_window(date))
            })
            .collect();

        let daily_stats = tokio::time::timeout(
            self.query_timeout,
            self.aggregator.trend(&calendar, now_ms, cancel),
        )
        .await
        .map_err(|_| {
            warn!(days, "trend computation exceeded the query deadline");
            StatsError::DeadlineExceeded
        })??;

        let unique_visitor_trend = daily_stats
            .iter()
            .map(|day| DatedCount {
                date: day.date.clone(),
                count: day.stats.unique_visitors,
            })
            .collect();
        let session_trend = daily_stats
            .iter()
            .map(|day| DatedCount {
                date: day.date.clone(),
                count: day.stats.sessions,
            })
            .collect();

        debug!(days, "trend computed");
        Ok(TrendStats {
            daily_stats,
            unique_visitor_trend,
            session_trend,
        })
    }

    async fn breakdown(&self, field: GroupField, range: &DateRange) -> StatsResult<Vec<GroupCount>> {
        let window = self.range_window(range, Utc::now().timestamp_millis())?;
        if window.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(self.aggregator.group_by(field, &window)).await
    }

    pub async fn device_stats(&self, range: &DateRange) -> StatsResult<Vec<GroupCount>> {
        self.breakdown(GroupField::DeviceType, range).await
    }

    pub async fn browser_stats(&self, range: &DateRange) -> StatsResult<Vec<GroupCount>> {
        self.breakdown(GroupField::Browser, range).await
    }

    pub async fn operating_system_stats(&self, range: &DateRange) -> StatsResult<Vec<GroupCount>> {
        self.breakdown(GroupField::OperatingSystem, range).await
    }

    pub async fn traffic_source_stats(&self, range: &DateRange) -> StatsResult<Vec<GroupCount>> {
        self.breakdown(GroupField::TrafficSource, range).await
    }

    pub async fn top_pages(&self, range: &DateRange, limit: i64) -> StatsResult<Vec<GroupCount>> {
        validate_limit(limit)?;
        let window = self.range_window(range, Utc::now().timestamp_millis())?;
        if window.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(self.aggregator.top_pages(&window, limit)).await
    }

    pub async fn performance_stats(&self, range: &DateRange) -> StatsResult<PerformanceStats> {
        let window = self.range_window(range, Utc::now().timestamp_millis())?;
        let agg = &self.aggregator;

        let (avg_response_time, error_rate) = self
            .bounded(async {
                tokio::try_join!(agg.avg_response_time(&window), agg.error_rate(&window))
            })
            .await?;

        Ok(PerformanceStats {
            avg_response_time,
            error_rate,
        })
    }

    pub async fn realtime(&self) -> StatsResult<RealtimeStats> {
        let now = Utc::now();
        let overview = self.overview_at(now.timestamp_millis()).await?;

        Ok(RealtimeStats {
            overview,
            last_updated: now.with_timezone(&self.offset).to_rfc3339(),
        })
    }

    /// Newest-first page of raw visits, continuing after `cursor` when given
    pub async fn recent_visits(&self, limit: i64, cursor: Option<&str>) -> StatsResult<VisitPage> {
        validate_limit(limit)?;
        let before = cursor
            .map(verify_cursor)
            .transpose()
            .map_err(|_| StatsError::Validation("invalid cursor".to_string()))?;

        let mut visits = self
            .bounded(self.storage.recent_visits(limit + 1, before.as_ref()))
            .await?;

        let has_more = visits.len() as i64 > limit;
        visits.truncate(limit as usize);

        let next_cursor = match visits.last() {
            Some(last) if has_more => Some(
                create_cursor(&CursorData {
                    visit_time: last.visit_time,
                    id: last.id,
                })
                .map_err(StorageError::from)?,
            ),
            _ => None,
        };

        Ok(VisitPage {
            visits,
            next_cursor,
        })
    }
}

fn validate_limit(limit: i64) -> StatsResult<()> {
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(StatsError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }
    Ok(())
}
