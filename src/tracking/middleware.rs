use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::analytics::{IpHeaders, VisitRecorder, VisitRequest};

/// Capture what the recorder needs before the request is handed on
fn visit_request(request: &Request) -> VisitRequest {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    };

    let traffic_source = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(params)| params.get("utm_source").cloned())
        .filter(|source| !source.is_empty());

    VisitRequest {
        ip: IpHeaders::from_headers(headers, peer),
        user_agent: header_value(header::USER_AGENT),
        referer: header_value(header::REFERER),
        method: Some(request.method().to_string()),
        url: request
            .uri()
            .path_and_query()
            .map_or_else(|| request.uri().path(), |pq| pq.as_str())
            .to_string(),
        user_id: None,
        traffic_source,
        page_stay_time_sec: None,
    }
}

/// Record the visit, run the handler, then attach status and latency
pub async fn track_visit(
    State(recorder): State<Arc<VisitRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let handle = recorder.record(visit_request(&request)).await;

    let response = next.run(request).await;

    if let Some(handle) = handle {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            visit_id = handle.id(),
            status = response.status().as_u16(),
            elapsed_ms,
            "tracked request completed"
        );
        recorder
            .complete_response(handle, response.status().as_u16(), elapsed_ms)
            .await;
    }

    response
}
