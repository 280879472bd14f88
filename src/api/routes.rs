use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analytics::StatsService;
use crate::config::CorsConfig;

use super::analytics::{
    get_browser_stats, get_device_stats, get_operating_system_stats, get_overview,
    get_performance_stats, get_realtime, get_recent_visits, get_top_pages,
    get_traffic_source_stats, get_trend,
};
use super::handlers::{health_check, AppState};

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub fn create_api_router(stats: Arc<StatsService>, cors: &CorsConfig) -> Router {
    let state = Arc::new(AppState { stats });

    let stats_routes = Router::new()
        .route("/overview", get(get_overview))
        .route("/trend", get(get_trend))
        .route("/devices", get(get_device_stats))
        .route("/browsers", get(get_browser_stats))
        .route("/operating-systems", get(get_operating_system_stats))
        .route("/traffic-sources", get(get_traffic_source_stats))
        .route("/top-pages", get(get_top_pages))
        .route("/performance", get(get_performance_stats))
        .route("/realtime", get(get_realtime))
        .route("/recent", get(get_recent_visits))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/visit-stats", stats_routes)
        .layer(cors_layer(cors))
}
