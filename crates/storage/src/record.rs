use lure_core::{EventKind, Status};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The recipient a result tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub position: String,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }
}

/// A snapshot of a result as stored in the backend.
///
/// `id` is the internal sequential key and must never reach a tracking URL
/// or API response; `rid` is the public identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: i64,
    pub campaign_id: i64,
    pub rid: String,
    #[serde(flatten)]
    pub recipient: Recipient,
    pub status: Status,
    pub reported: bool,
    pub ip: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub send_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_date: OffsetDateTime,
    /// Bumped by the backend on every committed save.
    pub version: i64,
}

/// Fields supplied when creating a result. The backend assigns `id` and
/// starts `version` at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResult {
    pub campaign_id: i64,
    pub rid: String,
    pub recipient: Recipient,
    pub status: Status,
    pub send_date: OffsetDateTime,
    pub modified_date: OffsetDateTime,
}

/// One entry of the event log. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub campaign_id: i64,
    pub rid: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    #[serde(rename = "message")]
    pub kind: EventKind,
    pub details: Option<serde_json::Value>,
    /// Set when the classifier attributed the hit to a gateway or prescanner.
    pub is_screened: bool,
}

/// An event to append. The backend assigns `id` at commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub campaign_id: i64,
    pub rid: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    #[serde(rename = "message")]
    pub kind: EventKind,
    pub details: Option<serde_json::Value>,
    pub is_screened: bool,
}

impl NewEvent {
    pub(crate) fn into_record(self, id: i64) -> EventRecord {
        EventRecord {
            id,
            campaign_id: self.campaign_id,
            rid: self.rid,
            email: self.email,
            time: self.time,
            kind: self.kind,
            details: self.details,
            is_screened: self.is_screened,
        }
    }
}
