//! Visitor identity: session id derivation and new-visitor detection

use std::sync::Arc;

use crate::config::SessionScheme;
use crate::storage::{Storage, StorageResult};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const MINUTE_MS: i64 = 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorIdentity {
    pub session_id: String,
    pub is_new_visitor: bool,
}

pub struct IdentityResolver {
    storage: Arc<dyn Storage>,
    scheme: SessionScheme,
    new_visitor_window_ms: i64,
}

impl IdentityResolver {
    pub fn new(storage: Arc<dyn Storage>, scheme: SessionScheme, new_visitor_window_days: i64) -> Self {
        Self {
            storage,
            scheme,
            new_visitor_window_ms: new_visitor_window_days * DAY_MS,
        }
    }

    /// Derive the session id and new-visitor flag for a request arriving at `now_ms`
    pub async fn resolve(&self, ip_address: &str, now_ms: i64) -> StorageResult<VisitorIdentity> {
        let last_visit = self.storage.latest_visit_time_by_ip(ip_address).await?;

        Ok(VisitorIdentity {
            session_id: session_id(self.scheme, ip_address, now_ms),
            is_new_visitor: is_new_visitor(last_visit, now_ms, self.new_visitor_window_ms),
        })
    }
}

/// Session id for an IP at an instant.
///
/// The literal scheme yields a distinct id for (almost) every request.
pub fn session_id(scheme: SessionScheme, ip_address: &str, now_ms: i64) -> String {
    match scheme {
        SessionScheme::Literal => format!("{}_{}", ip_address, now_ms),
        SessionScheme::Bucketed { bucket_minutes } => {
            let bucket_ms = i64::from(bucket_minutes.max(1)) * MINUTE_MS;
            let bucket_start = now_ms.div_euclid(bucket_ms) * bucket_ms;
            format!("{}_{}", ip_address, bucket_start)
        }
    }
}

/// New when never seen, or when the last visit is strictly older than the window
pub fn is_new_visitor(last_visit_ms: Option<i64>, now_ms: i64, window_ms: i64) -> bool {
    match last_visit_ms {
        None => true,
        Some(last) => last < now_ms - window_ms,
    }
}
