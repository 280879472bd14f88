use axum::{http::StatusCode, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::{DateRange, StatsError, StatsService};

pub struct AppState {
    pub stats: Arc<StatsService>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Optional `YYYY-MM-DD` bounds shared by the breakdown endpoints
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RangeQuery {
    pub fn date_range(&self) -> Result<DateRange, ApiError> {
        Ok(DateRange::new(
            parse_date("start_date", self.start_date.as_deref())?,
            parse_date("end_date", self.end_date.as_deref())?,
        ))
    }
}

fn parse_date(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| bad_request(format!("{} must be a date in YYYY-MM-DD format", name)))
}

pub fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

/// Map a query failure onto an HTTP status and JSON error body
pub fn stats_error(err: StatsError) -> ApiError {
    let status = match &err {
        StatsError::Validation(_) => StatusCode::BAD_REQUEST,
        StatsError::Unavailable(e) => {
            tracing::error!("Stats query failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
        StatsError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        StatsError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
