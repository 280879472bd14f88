//! Write path: classify, resolve identity and persist one visit per request.
//!
//! Recording is fail-open. A storage failure is logged and reported to the
//! caller as "nothing recorded", never as an error, so visit logging can not
//! break the request it observes.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::analytics::classifier::classify;
use crate::analytics::identity::IdentityResolver;
use crate::analytics::ip_extractor::IpHeaders;
use crate::config::AnalyticsConfig;
use crate::models::NewVisit;
use crate::storage::{Storage, StorageResult};

/// Request metadata captured at the boundary
#[derive(Debug, Clone, Default)]
pub struct VisitRequest {
    pub ip: IpHeaders,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub method: Option<String>,
    pub url: String,
    pub user_id: Option<String>,
    pub traffic_source: Option<String>,
    pub page_stay_time_sec: Option<i64>,
}

/// Opaque key of a recorded visit.
///
/// Deliberately not `Clone`: only the request that recorded the visit can
/// complete it, and completing consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct VisitHandle(i64);

impl VisitHandle {
    pub fn id(&self) -> i64 {
        self.0
    }
}

pub struct VisitRecorder {
    storage: Arc<dyn Storage>,
    identity: IdentityResolver,
}

impl VisitRecorder {
    pub fn new(storage: Arc<dyn Storage>, config: &AnalyticsConfig) -> Self {
        let identity = IdentityResolver::new(
            Arc::clone(&storage),
            config.session_scheme,
            config.new_visitor_window_days,
        );
        Self { storage, identity }
    }

    /// Record a visit. Returns None when nothing could be stored.
    pub async fn record(&self, request: VisitRequest) -> Option<VisitHandle> {
        self.record_at(request, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Record a visit stamped at `now_ms`
    pub async fn record_at(&self, request: VisitRequest, now_ms: i64) -> Option<VisitHandle> {
        let ip_address = request.ip.client_ip();
        let url = request.url.clone();

        match self.try_record(ip_address.clone(), request, now_ms).await {
            Ok(id) => {
                debug!(visit_id = id, ip = %ip_address, url = %url, "visit recorded");
                Some(VisitHandle(id))
            }
            Err(err) => {
                error!(ip = %ip_address, url = %url, error = %err, "failed to record visit");
                None
            }
        }
    }

    async fn try_record(
        &self,
        ip_address: String,
        request: VisitRequest,
        now_ms: i64,
    ) -> StorageResult<i64> {
        let identity = self.identity.resolve(&ip_address, now_ms).await?;
        let classification = classify(request.user_agent.as_deref());

        let visit = NewVisit {
            user_id: request.user_id,
            ip_address,
            url: request.url,
            http_method: request.method,
            user_agent: request.user_agent,
            referer: request.referer,
            traffic_source: request.traffic_source,
            page_stay_time_sec: request.page_stay_time_sec,
            session_id: identity.session_id,
            device_type: classification.device_type,
            operating_system: classification.operating_system,
            browser: classification.browser,
            is_new_visitor: identity.is_new_visitor,
            visit_time: now_ms,
        };

        self.storage.insert_visit(&visit).await
    }

    /// Attach the response outcome to a recorded visit.
    ///
    /// A visit that no longer exists is a silent no-op; storage errors are
    /// logged and swallowed.
    pub async fn complete_response(&self, handle: VisitHandle, status_code: u16, elapsed_ms: u64) {
        let elapsed_ms = i64::try_from(elapsed_ms).unwrap_or(i64::MAX);

        match self
            .storage
            .patch_response(handle.0, i32::from(status_code), elapsed_ms)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(visit_id = handle.0, "visit already gone, response not recorded"),
            Err(err) => warn!(visit_id = handle.0, error = %err, "failed to record visit response"),
        }
    }
}
