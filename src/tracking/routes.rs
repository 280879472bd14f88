use axum::{http::StatusCode, middleware, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::analytics::VisitRecorder;
use crate::config::SiteConfig;

use super::middleware::track_visit;

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Site router: every request is recorded, whatever it resolves to
pub fn create_site_router(recorder: Arc<VisitRecorder>, site: &SiteConfig) -> Router {
    let router = match &site.static_dir {
        Some(dir) => Router::new().fallback_service(ServeDir::new(dir)),
        None => Router::new().fallback(not_found),
    };

    router.layer(middleware::from_fn_with_state(recorder, track_visit))
}
