//! Visit statistics API handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::models::{
    GroupCount, PerformanceStats, RealtimeStats, TrendStats, VisitOverview, VisitPage,
};

use super::handlers::{stats_error, ApiError, AppState, RangeQuery};

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct TopPagesQuery {
    #[serde(default = "default_top_pages_limit")]
    pub limit: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn default_top_pages_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: i64,
    pub cursor: Option<String>,
}

fn default_recent_limit() -> i64 {
    20
}

/// Named lists of grouped counts, e.g. `{"devices": [...]}`
#[derive(Debug, Serialize)]
pub struct DeviceStatsResponse {
    pub devices: Vec<GroupCount>,
}

#[derive(Debug, Serialize)]
pub struct BrowserStatsResponse {
    pub browsers: Vec<GroupCount>,
}

#[derive(Debug, Serialize)]
pub struct OperatingSystemStatsResponse {
    pub operating_systems: Vec<GroupCount>,
}

#[derive(Debug, Serialize)]
pub struct TrafficSourceStatsResponse {
    pub sources: Vec<GroupCount>,
}

#[derive(Debug, Serialize)]
pub struct TopPagesResponse {
    pub pages: Vec<GroupCount>,
}

pub async fn get_overview(State(state): State<Arc<AppState>>) -> Result<Json<VisitOverview>, ApiError> {
    state.stats.overview().await.map(Json).map_err(stats_error)
}

pub async fn get_trend(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<TrendStats>, ApiError> {
    state.stats.trend(query.days).await.map(Json).map_err(stats_error)
}

pub async fn get_device_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<DeviceStatsResponse>, ApiError> {
    let range = query.date_range()?;
    let devices = state.stats.device_stats(&range).await.map_err(stats_error)?;
    Ok(Json(DeviceStatsResponse { devices }))
}

pub async fn get_browser_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<BrowserStatsResponse>, ApiError> {
    let range = query.date_range()?;
    let browsers = state.stats.browser_stats(&range).await.map_err(stats_error)?;
    Ok(Json(BrowserStatsResponse { browsers }))
}

pub async fn get_operating_system_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<OperatingSystemStatsResponse>, ApiError> {
    let range = query.date_range()?;
    let operating_systems = state
        .stats
        .operating_system_stats(&range)
        .await
        .map_err(stats_error)?;
    Ok(Json(OperatingSystemStatsResponse { operating_systems }))
}

pub async fn get_traffic_source_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<TrafficSourceStatsResponse>, ApiError> {
    let range = query.date_range()?;
    let sources = state
        .stats
        .traffic_source_stats(&range)
        .await
        .map_err(stats_error)?;
    Ok(Json(TrafficSourceStatsResponse { sources }))
}

pub async fn get_top_pages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopPagesQuery>,
) -> Result<Json<TopPagesResponse>, ApiError> {
    let range = RangeQuery {
        start_date: query.start_date,
        end_date: query.end_date,
    }
    .date_range()?;
    let pages = state
        .stats
        .top_pages(&range, query.limit)
        .await
        .map_err(stats_error)?;
    Ok(Json(TopPagesResponse { pages }))
}

pub async fn get_performance_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<PerformanceStats>, ApiError> {
    let range = query.date_range()?;
    state
        .stats
        .performance_stats(&range)
        .await
        .map(Json)
        .map_err(stats_error)
}

pub async fn get_realtime(State(state): State<Arc<AppState>>) -> Result<Json<RealtimeStats>, ApiError> {
    state.stats.realtime().await.map(Json).map_err(stats_error)
}

pub async fn get_recent_visits(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<VisitPage>, ApiError> {
    state
        .stats
        .recent_visits(query.limit, query.cursor.as_deref())
        .await
        .map(Json)
        .map_err(stats_error)
}
