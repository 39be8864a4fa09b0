//! Recipient-facing tracking endpoints.
//!
//! These are hit by mail clients, gateways and browsers, so they never
//! return JSON and never say why a lookup failed: an unknown or missing
//! `rid` is a plain 404.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use lure_core::InteractionDetails;
use lure_tracker::{Outcome, TrackerError};

use super::state::AppState;

/// 1x1 transparent GIF.
static TRANSPARENT_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const LANDING_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>Welcome</title></head>\
<body><p>Thanks for visiting.</p></body></html>\n";

const SUBMITTED_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>Thank you</title></head>\
<body><p>Your response has been received.</p></body></html>\n";

type Params = Vec<(String, String)>;

/// A parsed hit: the target `rid` plus what the transport saw.
struct Hit {
    rid: String,
    ip: String,
    details: InteractionDetails,
}

impl Hit {
    fn parse(
        state: &AppState,
        peer: SocketAddr,
        headers: &HeaderMap,
        params: Params,
    ) -> Option<Self> {
        let rid = params
            .iter()
            .find(|(k, _)| k == "rid")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())?;
        let ip = state.client_ip(peer, headers);
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let details = params
            .into_iter()
            .fold(InteractionDetails::new(ip.clone(), user_agent), |d, (k, v)| {
                d.with_field(k, v)
            });
        Some(Self { rid, ip, details })
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

fn tracking_error(err: TrackerError, what: &str, rid: &str) -> Response {
    if err.is_not_found() {
        tracing::debug!(%rid, "{what} for unknown result");
        return not_found();
    }
    tracing::error!(error = %err, %rid, "failed to record {what}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Fill in the Result's IP and coordinates in the background, when the hit
/// can stand in for the recipient's location.
fn enrich(state: &AppState, outcome: &Outcome, ip: String) {
    if !outcome.locates_recipient() {
        return;
    }
    let tracker = state.tracker.clone();
    let outcome = outcome.clone();
    tokio::spawn(async move {
        if let Err(e) = tracker.locate(&outcome, &ip).await {
            tracing::warn!(error = %e, rid = %outcome.result.rid, "geo update failed");
        }
    });
}

fn log_outcome(outcome: &Outcome) {
    tracing::debug!(
        rid = %outcome.result.rid,
        status = %outcome.result.status,
        screened = outcome.event.is_screened,
        "hit recorded"
    );
}

/// GET /track
pub(crate) async fn handle_open(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Response {
    let Some(hit) = Hit::parse(&state, peer, &headers, params) else {
        return not_found();
    };
    match state.tracker.email_opened(&hit.rid, hit.details).await {
        Ok(outcome) => {
            log_outcome(&outcome);
            enrich(&state, &outcome, hit.ip);
            (
                [
                    (header::CONTENT_TYPE, "image/gif"),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                &TRANSPARENT_GIF[..],
            )
                .into_response()
        }
        Err(e) => tracking_error(e, "open", &hit.rid),
    }
}

/// GET /
pub(crate) async fn handle_click(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Response {
    let Some(hit) = Hit::parse(&state, peer, &headers, params) else {
        return not_found();
    };
    match state.tracker.clicked_link(&hit.rid, hit.details).await {
        Ok(outcome) => {
            log_outcome(&outcome);
            enrich(&state, &outcome, hit.ip);
            match &state.tracking.landing_url {
                Some(url) => Redirect::to(url).into_response(),
                None => Html(LANDING_PAGE).into_response(),
            }
        }
        Err(e) => tracking_error(e, "click", &hit.rid),
    }
}

/// POST /
///
/// `rid` may arrive in the query string or in the form body.
pub(crate) async fn handle_submit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(mut params): Query<Params>,
    Form(fields): Form<Params>,
) -> Response {
    params.extend(fields);
    let Some(hit) = Hit::parse(&state, peer, &headers, params) else {
        return not_found();
    };
    match state.tracker.form_submit(&hit.rid, hit.details).await {
        Ok(outcome) => {
            log_outcome(&outcome);
            enrich(&state, &outcome, hit.ip);
            match &state.tracking.redirect_url {
                Some(url) => Redirect::to(url).into_response(),
                None => Html(SUBMITTED_PAGE).into_response(),
            }
        }
        Err(e) => tracking_error(e, "submission", &hit.rid),
    }
}

/// GET|POST /report
pub(crate) async fn handle_report(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Response {
    let Some(hit) = Hit::parse(&state, peer, &headers, params) else {
        return not_found();
    };
    match state.tracker.email_report(&hit.rid, hit.details).await {
        Ok(outcome) => {
            log_outcome(&outcome);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => tracking_error(e, "report", &hit.rid),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;
    use lure_core::ScreeningPolicy;
    use lure_storage::{MemoryStorage, Recipient};
    use lure_tracker::{GeoEntry, ResultTracker, StaticGeoTable};

    use super::*;
    use crate::config::TrackingConfig;
    use crate::serve::state::RateLimiter;

    const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/124.0 Safari/537.36";
    const PROXY_UA: &str = "Mozilla/5.0 (via ggpht.com GoogleImageProxy)";

    fn state() -> AppState {
        with_tracker(ResultTracker::new(Arc::new(MemoryStorage::new())))
    }

    fn with_tracker(tracker: ResultTracker<MemoryStorage>) -> AppState {
        AppState {
            tracker,
            rate_limiter: RateLimiter::per_minute(60),
            api_key: None,
            tracking: TrackingConfig::default(),
            trust_forwarded_for: false,
            data_file: None,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn gif_has_header_and_trailer() {
        assert_eq!(&TRANSPARENT_GIF[..6], b"GIF89a");
        assert_eq!(TRANSPARENT_GIF[42], 0x3b);
    }

    #[test]
    fn hit_requires_rid() {
        let peer: SocketAddr = "198.51.100.7:40000".parse().unwrap();
        let headers = HeaderMap::new();
        assert!(Hit::parse(&state(), peer, &headers, params(&[])).is_none());
        assert!(Hit::parse(&state(), peer, &headers, params(&[("rid", " ")])).is_none());
    }

    #[test]
    fn hit_carries_browser_and_fields() {
        let peer: SocketAddr = "198.51.100.7:40000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("TestAgent/1.0"));
        let hit = Hit::parse(
            &state(),
            peer,
            &headers,
            params(&[("rid", "Ab3dE7q"), ("username", "alice")]),
        )
        .unwrap();
        assert_eq!(hit.rid, "Ab3dE7q");
        assert_eq!(hit.ip, "198.51.100.7");
        assert_eq!(hit.details.browser.user_agent, "TestAgent/1.0");
        assert_eq!(hit.details.payload["username"], ["alice"]);
    }

    fn agent(ua: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(ua));
        headers
    }

    #[tokio::test]
    async fn gateway_open_after_click_keeps_recipient_location() {
        let geo = StaticGeoTable::new(vec![
            GeoEntry {
                cidr: "198.51.100.0/24".parse().unwrap(),
                latitude: 51.5,
                longitude: -0.1,
            },
            GeoEntry {
                cidr: "66.249.84.0/24".parse().unwrap(),
                latitude: 37.4,
                longitude: -122.1,
            },
        ]);
        let tracker = ResultTracker::new(Arc::new(MemoryStorage::new()))
            .with_policy(ScreeningPolicy::Suppress)
            .with_geo(Arc::new(geo));
        let state = Arc::new(with_tracker(tracker));
        let rid = state
            .tracker
            .create_result(1, Recipient::new("alice@example.com"))
            .await
            .unwrap()
            .rid;

        let human: SocketAddr = "198.51.100.7:40000".parse().unwrap();
        handle_click(
            State(state.clone()),
            ConnectInfo(human),
            agent(CHROME_UA),
            Query(params(&[("rid", rid.as_str())])),
        )
        .await;
        let mut located = false;
        for _ in 0..50 {
            if state.tracker.result(&rid).await.unwrap().ip == "198.51.100.7" {
                located = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(located, "click did not record the recipient's address");

        let scanner: SocketAddr = "66.249.84.10:50000".parse().unwrap();
        let resp = handle_open(
            State(state.clone()),
            ConnectInfo(scanner),
            agent(PROXY_UA),
            Query(params(&[("rid", rid.as_str())])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let r = state.tracker.result(&rid).await.unwrap();
        assert_eq!(r.ip, "198.51.100.7");
        assert_eq!((r.latitude, r.longitude), (51.5, -0.1));
    }
}
