//! JSON admin API, mounted under `/api`.
//!
//! - POST /api/campaigns/{id}/results   - create a result for a recipient
//! - GET  /api/campaigns/{id}/results   - results and event timeline
//! - GET  /api/campaigns/{id}/stats     - campaign statistics
//! - GET  /api/results/{rid}            - one result
//! - POST /api/results/{rid}/sent       - send subsystem: message delivered
//! - POST /api/results/{rid}/error      - send subsystem: permanent failure
//! - POST /api/results/{rid}/backoff    - send subsystem: retry scheduled
//!
//! Results are exposed by their public `rid` only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lure_core::{EventKind, Status};
use lure_storage::{EventRecord, Recipient, ResultRecord};
use lure_tracker::{Outcome, TrackerError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::json_error;
use super::state::AppState;

/// A Result as shown to API clients.
#[derive(Debug, Serialize)]
pub(crate) struct ResultView {
    pub(crate) id: String,
    pub(crate) campaign_id: i64,
    pub(crate) email: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) position: String,
    pub(crate) status: Status,
    pub(crate) reported: bool,
    pub(crate) ip: String,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) send_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) modified_date: OffsetDateTime,
}

impl From<ResultRecord> for ResultView {
    fn from(r: ResultRecord) -> Self {
        Self {
            id: r.rid,
            campaign_id: r.campaign_id,
            email: r.recipient.email,
            first_name: r.recipient.first_name,
            last_name: r.recipient.last_name,
            position: r.recipient.position,
            status: r.status,
            reported: r.reported,
            ip: r.ip,
            latitude: r.latitude,
            longitude: r.longitude,
            send_date: r.send_date,
            modified_date: r.modified_date,
        }
    }
}

/// An Event as shown to API clients.
#[derive(Debug, Serialize)]
pub(crate) struct EventView {
    pub(crate) campaign_id: i64,
    pub(crate) rid: String,
    pub(crate) email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) time: OffsetDateTime,
    pub(crate) message: EventKind,
    pub(crate) details: Option<serde_json::Value>,
    pub(crate) is_screened: bool,
}

impl From<EventRecord> for EventView {
    fn from(e: EventRecord) -> Self {
        Self {
            campaign_id: e.campaign_id,
            rid: e.rid,
            email: e.email,
            time: e.time,
            message: e.kind,
            details: e.details,
            is_screened: e.is_screened,
        }
    }
}

#[derive(Debug, Serialize)]
struct OutcomeView {
    result: ResultView,
    transitioned: bool,
    is_screened: bool,
}

impl From<Outcome> for OutcomeView {
    fn from(o: Outcome) -> Self {
        Self {
            is_screened: o.event.is_screened,
            transitioned: o.transitioned,
            result: o.result.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendErrorRequest {
    pub(crate) error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BackoffRequest {
    pub(crate) error: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) send_date: OffsetDateTime,
}

fn api_error(err: TrackerError) -> Response {
    if err.is_not_found() {
        return json_error(StatusCode::NOT_FOUND, &err.to_string()).into_response();
    }
    match err {
        TrackerError::Serialization(_) => {
            json_error(StatusCode::BAD_REQUEST, &err.to_string()).into_response()
        }
        _ => {
            tracing::error!(error = %err, "admin API request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()).into_response()
        }
    }
}

fn outcome_response(result: Result<Outcome, TrackerError>) -> Response {
    match result {
        Ok(o) => Json(OutcomeView::from(o)).into_response(),
        Err(e) => api_error(e),
    }
}

/// POST /api/campaigns/{id}/results
pub(crate) async fn handle_create_result(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<i64>,
    Json(recipient): Json<Recipient>,
) -> Response {
    if recipient.email.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "email is required").into_response();
    }
    match state.tracker.create_result(campaign_id, recipient).await {
        Ok(r) => (StatusCode::CREATED, Json(ResultView::from(r))).into_response(),
        Err(e) => api_error(e),
    }
}

/// GET /api/campaigns/{id}/results
pub(crate) async fn handle_list_results(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<i64>,
) -> Response {
    let results = match state.tracker.results(campaign_id).await {
        Ok(r) => r,
        Err(e) => return api_error(e),
    };
    let timeline = match state.tracker.campaign_timeline(campaign_id).await {
        Ok(t) => t,
        Err(e) => return api_error(e),
    };
    let results: Vec<ResultView> = results.into_iter().map(ResultView::from).collect();
    let timeline: Vec<EventView> = timeline.into_iter().map(EventView::from).collect();
    Json(serde_json::json!({
        "campaign_id": campaign_id,
        "results": results,
        "timeline": timeline,
    }))
    .into_response()
}

/// GET /api/campaigns/{id}/stats
pub(crate) async fn handle_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<i64>,
) -> Response {
    match state.tracker.campaign_stats(campaign_id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => api_error(e),
    }
}

/// GET /api/results/{rid}
pub(crate) async fn handle_get_result(
    State(state): State<Arc<AppState>>,
    Path(rid): Path<String>,
) -> Response {
    match state.tracker.result(&rid).await {
        Ok(r) => Json(ResultView::from(r)).into_response(),
        Err(e) => api_error(e),
    }
}

/// POST /api/results/{rid}/sent
pub(crate) async fn handle_sent(
    State(state): State<Arc<AppState>>,
    Path(rid): Path<String>,
) -> Response {
    outcome_response(state.tracker.email_sent(&rid).await)
}

/// POST /api/results/{rid}/error
pub(crate) async fn handle_send_error(
    State(state): State<Arc<AppState>>,
    Path(rid): Path<String>,
    Json(req): Json<SendErrorRequest>,
) -> Response {
    outcome_response(state.tracker.email_error(&rid, &req.error).await)
}

/// POST /api/results/{rid}/backoff
pub(crate) async fn handle_backoff(
    State(state): State<Arc<AppState>>,
    Path(rid): Path<String>,
    Json(req): Json<BackoffRequest>,
) -> Response {
    outcome_response(
        state
            .tracker
            .email_backoff(&rid, &req.error, req.send_date)
            .await,
    )
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record() -> ResultRecord {
        ResultRecord {
            id: 42,
            campaign_id: 3,
            rid: "Ab3dE7q".to_string(),
            recipient: Recipient::new("alice@example.com"),
            status: Status::Clicked,
            reported: true,
            ip: "198.51.100.23".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            send_date: datetime!(2025-03-01 9:00 UTC),
            modified_date: datetime!(2025-03-01 9:05 UTC),
            version: 4,
        }
    }

    #[test]
    fn result_view_hides_internal_id() {
        let json = serde_json::to_value(ResultView::from(record())).unwrap();
        assert_eq!(json["id"], "Ab3dE7q");
        assert!(json.get("version").is_none());
        assert!(json.get("rid").is_none());
        assert!(!json.to_string().contains("42"));
        assert_eq!(json["send_date"], "2025-03-01T09:00:00Z");
    }

    #[test]
    fn backoff_request_parses_rfc3339() {
        let req: BackoffRequest = serde_json::from_value(serde_json::json!({
            "error": "421 try again later",
            "send_date": "2025-03-01T09:05:00Z",
        }))
        .unwrap();
        assert_eq!(req.send_date, datetime!(2025-03-01 9:05 UTC));
    }
}
