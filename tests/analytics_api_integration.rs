//! Integration tests for the visit statistics API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use footfall::analytics::{IpHeaders, StatsService, VisitRecorder, VisitRequest};
use footfall::api;
use footfall::config::{AnalyticsConfig, CorsConfig};
use footfall::storage::{SqliteStorage, Storage};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const CHROME: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn create_test_app() -> (Arc<dyn Storage>, Router) {
    footfall::cursor::init_cursor_hmac_key(Some("test_secret_key_for_hmac_signing"));
    let storage = create_test_storage().await;
    let stats = Arc::new(StatsService::new(Arc::clone(&storage), &AnalyticsConfig::default()));
    let app = api::create_api_router(stats, &CorsConfig::default());
    (storage, app)
}

async fn record(storage: &Arc<dyn Storage>, ip: &str, url: &str) {
    let recorder = VisitRecorder::new(Arc::clone(storage), &AnalyticsConfig::default());
    let request = VisitRequest {
        ip: IpHeaders {
            forwarded_for: Some(ip.to_string()),
            ..IpHeaders::default()
        },
        user_agent: Some(CHROME.to_string()),
        method: Some("GET".to_string()),
        url: url.to_string(),
        ..VisitRequest::default()
    };
    recorder.record(request).await.unwrap();
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let (_, app) = create_test_app().await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OK");
}

#[tokio::test]
async fn test_overview_endpoint() {
    let (storage, app) = create_test_app().await;
    record(&storage, "203.0.113.1", "/").await;
    record(&storage, "203.0.113.2", "/").await;

    let (status, body) = get(&app, "/api/visit-stats/overview").await;
    assert_eq!(status, StatusCode::OK);

    // The server reads the wall clock, so midnight may pass between record and query
    let today = body["today_visits"].as_i64().unwrap();
    let yesterday = body["yesterday_visits"].as_i64().unwrap();
    assert_eq!(today + yesterday, 2);
    assert_eq!(
        body["today_unique_visitors"].as_i64().unwrap()
            + body["yesterday_unique_visitors"].as_i64().unwrap(),
        2
    );
    if yesterday == 0 {
        assert_eq!(body["visit_growth_rate"], 0.0);
    }
}

#[tokio::test]
async fn test_trend_endpoint_defaults_to_thirty_days() {
    let (_, app) = create_test_app().await;

    let (status, body) = get(&app, "/api/visit-stats/trend").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["daily_stats"].as_array().unwrap().len(), 30);

    let (status, body) = get(&app, "/api/visit-stats/trend?days=7").await;
    assert_eq!(status, StatusCode::OK);
    let daily = body["daily_stats"].as_array().unwrap();
    assert_eq!(daily.len(), 7);
    assert!(daily[0]["date"].as_str().unwrap() < daily[6]["date"].as_str().unwrap());
    assert!(daily[0].get("visits").is_some());
    assert_eq!(body["session_trend"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_trend_days_out_of_range() {
    let (_, app) = create_test_app().await;

    for days in ["0", "366", "-3"] {
        let (status, body) = get(&app, &format!("/api/visit-stats/trend?days={}", days)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "days={}", days);
        assert!(body["error"].as_str().unwrap().contains("days"));
    }
}

#[tokio::test]
async fn test_top_pages_limit_validation() {
    let (_, app) = create_test_app().await;

    for limit in ["0", "101"] {
        let (status, _) = get(&app, &format!("/api/visit-stats/top-pages?limit={}", limit)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "limit={}", limit);
    }

    let (status, _) = get(&app, "/api/visit-stats/top-pages?limit=100").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_top_pages_ranking() {
    let (storage, app) = create_test_app().await;
    for url in ["/a", "/b", "/b", "/c", "/c", "/c"] {
        record(&storage, "203.0.113.9", url).await;
    }

    let (status, body) = get(&app, "/api/visit-stats/top-pages?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let pages = body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0]["dimension"], "/c");
    assert_eq!(pages[0]["visit_count"], 3);
    assert_eq!(pages[1]["dimension"], "/b");
}

#[tokio::test]
async fn test_breakdown_endpoints() {
    let (storage, app) = create_test_app().await;
    record(&storage, "203.0.113.1", "/").await;

    let (status, body) = get(&app, "/api/visit-stats/devices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"][0]["dimension"], "desktop");

    let (status, body) = get(&app, "/api/visit-stats/browsers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["browsers"][0]["dimension"], "Chrome");

    let (status, body) = get(&app, "/api/visit-stats/operating-systems").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operating_systems"][0]["dimension"], "Linux");

    let (status, body) = get(&app, "/api/visit-stats/traffic-sources").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"][0]["dimension"], Value::Null);
    assert_eq!(body["sources"][0]["visit_count"], 1);
}

#[tokio::test]
async fn test_date_range_validation() {
    let (_, app) = create_test_app().await;

    let (status, _) = get(
        &app,
        "/api/visit-stats/devices?start_date=2025-10-10&end_date=2025-10-01",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "/api/visit-stats/browsers?start_date=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("start_date"));

    let (status, body) = get(
        &app,
        "/api/visit-stats/devices?start_date=2025-10-01&end_date=2025-10-01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_performance_and_realtime() {
    let (storage, app) = create_test_app().await;
    record(&storage, "203.0.113.1", "/").await;

    let (status, body) = get(&app, "/api/visit-stats/performance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["avg_response_time"], 0.0);
    assert_eq!(body["error_rate"], 0.0);

    let (status, body) = get(&app, "/api/visit-stats/realtime").await;
    assert_eq!(status, StatusCode::OK);
    let overview = &body["overview"];
    assert_eq!(
        overview["today_visits"].as_i64().unwrap() + overview["yesterday_visits"].as_i64().unwrap(),
        1
    );
    assert!(!body["last_updated"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_visits_pagination() {
    let (storage, app) = create_test_app().await;
    for i in 0..3 {
        record(&storage, &format!("203.0.113.{}", i), "/").await;
    }

    let (status, body) = get(&app, "/api/visit-stats/recent?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visits"].as_array().unwrap().len(), 2);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let (status, body) = get(&app, &format!("/api/visit-stats/recent?limit=2&cursor={}", cursor)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visits"].as_array().unwrap().len(), 1);
    assert_eq!(body["next_cursor"], Value::Null);

    let (status, _) = get(&app, "/api/visit-stats/recent?cursor=forged.cursor").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/api/visit-stats/recent?limit=101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
