//! Data models for visit analytics queries

use serde::Serialize;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Half-open time window `[start_ms, end_ms)` in Unix epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Window {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// The `days` days leading up to `now_ms`
    pub fn last_days(now_ms: i64, days: i64) -> Self {
        Self {
            start_ms: now_ms - days * DAY_MS,
            end_ms: now_ms,
        }
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms < self.end_ms
    }

    pub fn is_empty(&self) -> bool {
        self.end_ms <= self.start_ms
    }
}

/// Columns that can be counted distinctly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    IpAddress,
    SessionId,
}

impl DistinctField {
    pub fn column(&self) -> &'static str {
        match self {
            DistinctField::IpAddress => "ip_address",
            DistinctField::SessionId => "session_id",
        }
    }
}

/// Columns that visits can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    DeviceType,
    Browser,
    OperatingSystem,
    TrafficSource,
    Url,
}

impl GroupField {
    pub fn column(&self) -> &'static str {
        match self {
            GroupField::DeviceType => "device_type",
            GroupField::Browser => "browser",
            GroupField::OperatingSystem => "operating_system",
            GroupField::TrafficSource => "traffic_source",
            GroupField::Url => "url",
        }
    }
}

/// One row of a grouped count. `dimension` is None for rows where the
/// grouped column was never set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct GroupCount {
    pub dimension: Option<String>,
    pub visit_count: i64,
}

/// The four per-window counters that make up one trend point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub visits: i64,
    pub unique_visitors: i64,
    pub sessions: i64,
    pub new_visitors: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitOverview {
    pub today_visits: i64,
    pub today_unique_visitors: i64,
    pub today_sessions: i64,
    pub today_new_visitors: i64,
    pub yesterday_visits: i64,
    pub yesterday_unique_visitors: i64,
    pub week_visits: i64,
    pub week_unique_visitors: i64,
    pub month_visits: i64,
    pub month_unique_visitors: i64,
    pub visit_growth_rate: f64,
    pub visitor_growth_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStat {
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    #[serde(flatten)]
    pub stats: DayStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendStats {
    pub daily_stats: Vec<DailyStat>,
    pub unique_visitor_trend: Vec<DatedCount>,
    pub session_trend: Vec<DatedCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub avg_response_time: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeStats {
    pub overview: VisitOverview,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitPage {
    pub visits: Vec<crate::models::VisitEvent>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_half_open() {
        let window = Window::new(1_000, 2_000);
        assert!(window.contains(1_000));
        assert!(window.contains(1_999));
        assert!(!window.contains(2_000));
        assert!(!window.contains(999));
    }

    #[test]
    fn test_last_days_window() {
        let now = 100 * DAY_MS;
        let window = Window::last_days(now, 30);
        assert_eq!(window.end_ms, now);
        assert_eq!(window.start_ms, 70 * DAY_MS);
    }
}
