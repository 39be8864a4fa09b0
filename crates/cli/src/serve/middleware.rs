//! Admin API guards: the per-address request budget and the API key check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::json_error;
use super::state::AppState;

/// Applied to the operator-facing admin routes only. The send subsystem's
/// callbacks arrive in bursts from one address and are never throttled.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = state.client_ip(peer, request.headers());
    let key = ip.parse().unwrap_or(peer.ip());
    let Err(retry_after) = state.rate_limiter.check(key).await else {
        return next.run(request).await;
    };

    tracing::warn!(%ip, limit = state.rate_limiter.limit(), "admin API rate limit exceeded");
    let body = serde_json::json!({
        "error": "rate limit exceeded",
        "retry_after": retry_after,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// The key a request offers: `Authorization: Bearer <key>`, else `X-API-Key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer.or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

/// With no key configured every request passes. Otherwise a missing key is
/// 401 and a wrong one 403.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    match presented_key(request.headers()) {
        Some(key) if key == expected => next.run(request).await,
        Some(_) => json_error(StatusCode::FORBIDDEN, "invalid API key").into_response(),
        None => json_error(StatusCode::UNAUTHORIZED, "authentication required").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_token_is_preferred() {
        let h = headers(&[("authorization", "Bearer s3cret"), ("x-api-key", "other")]);
        assert_eq!(presented_key(&h), Some("s3cret"));
    }

    #[test]
    fn api_key_header_used_without_bearer() {
        assert_eq!(presented_key(&headers(&[("x-api-key", "s3cret")])), Some("s3cret"));
        let basic = headers(&[("authorization", "Basic Zm9v"), ("x-api-key", "s3cret")]);
        assert_eq!(presented_key(&basic), Some("s3cret"));
    }

    #[test]
    fn no_key_presented() {
        assert_eq!(presented_key(&HeaderMap::new()), None);
        assert_eq!(presented_key(&headers(&[("authorization", "Basic Zm9v")])), None);
    }
}
