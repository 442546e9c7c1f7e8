//! Admission control middleware

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};

use crate::admission::AdmissionDecision;
use crate::error::Error;
use crate::server::state::AppState;

/// Identity used when the peer address is unknown
const UNKNOWN_CALLER: &str = "unknown";

/// Reject callers over their quota before any pipeline work starts
pub async fn admission(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = caller_identity(&req, state.config().admission.trust_forwarded_for);

    match state.admission().admit(&identity) {
        AdmissionDecision::Allowed { remaining } => {
            tracing::debug!(caller = %identity, remaining, "request admitted");
            next.run(req).await
        }
        AdmissionDecision::Denied { retry_after } => {
            // Retry-After in whole seconds, minimum 1
            let retry_after_secs = std::cmp::max(1, (retry_after.as_millis() as u64 + 999) / 1000);
            tracing::warn!(caller = %identity, retry_after_secs, "admission rejected");
            Error::AdmissionRejected { retry_after_secs }.into_response()
        }
    }
}

fn caller_identity(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_for(req.headers()) {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .and_then(|ip| ip.parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(peer: Option<&str>, xff: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/upload");
        if let Some(xff) = xff {
            builder = builder.header("x-forwarded-for", xff);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        req
    }

    #[test]
    fn test_peer_address_is_default_identity() {
        let req = request(Some("203.0.113.9:51234"), Some("198.51.100.1"));
        assert_eq!(caller_identity(&req, false), "203.0.113.9");
    }

    #[test]
    fn test_forwarded_for_when_trusted() {
        let req = request(Some("10.0.0.2:443"), Some("198.51.100.1, 10.0.0.2"));
        assert_eq!(caller_identity(&req, true), "198.51.100.1");
    }

    #[test]
    fn test_malformed_forwarded_for_falls_back_to_peer() {
        let req = request(Some("10.0.0.2:443"), Some("not-an-ip"));
        assert_eq!(caller_identity(&req, true), "10.0.0.2");
    }

    #[test]
    fn test_missing_peer_is_unknown() {
        let req = request(None, None);
        assert_eq!(caller_identity(&req, false), UNKNOWN_CALLER);
    }
}
