//! Client IP extraction from HTTP headers
//!
//! Precedence:
//! - first entry of `X-Forwarded-For`
//! - `X-Real-IP`
//! - the socket peer address
//!
//! A header counts only when it is present, non-empty and not the literal
//! `unknown` that some proxies emit. The winning value is kept verbatim
//! (trimmed) and not parsed, so the stored IP matches what the proxy sent.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Raw inputs to client IP resolution, detached from any HTTP library
#[derive(Debug, Clone, Default)]
pub struct IpHeaders {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub peer_addr: Option<String>,
}

impl IpHeaders {
    /// Capture the relevant headers from a request
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        };

        Self {
            forwarded_for: header("x-forwarded-for"),
            real_ip: header("x-real-ip"),
            peer_addr: peer.map(|addr| addr.ip().to_string()),
        }
    }

    /// Resolve the client IP according to header precedence
    pub fn client_ip(&self) -> String {
        if let Some(ip) = self
            .forwarded_for
            .as_deref()
            .and_then(|xff| usable(xff.split(',').next().unwrap_or(xff)))
        {
            return ip;
        }

        if let Some(ip) = self.real_ip.as_deref().and_then(usable) {
            return ip;
        }

        self.peer_addr
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn usable(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(value.to_string())
    }
}
