//! Typed event payloads.
//!
//! Each inbound interaction becomes one [`EventPayload`]. The payload carries
//! only what its kind needs; it is flattened to free-form JSON when the event
//! is written to the log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::EventKind;

/// Network and browser metadata extracted by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    /// Source IP as reported by the transport. May be empty or malformed.
    #[serde(default)]
    pub address: String,
    #[serde(rename = "user-agent", default)]
    pub user_agent: String,
}

/// Details of a recipient interaction (pixel fetch, click, form post, report).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionDetails {
    /// Submitted form fields or query parameters, multi-valued.
    #[serde(default)]
    pub payload: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub browser: BrowserInfo,
}

impl InteractionDetails {
    pub fn new(address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            payload: BTreeMap::new(),
            browser: BrowserInfo {
                address: address.into(),
                user_agent: user_agent.into(),
            },
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// Detail payload of a failed send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFailure {
    pub error: String,
}

/// One occurrence against a Result, before it is written to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Sent,
    SendError(SendFailure),
    Opened(InteractionDetails),
    Clicked(InteractionDetails),
    Submitted(InteractionDetails),
    Reported(InteractionDetails),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Sent => EventKind::Sent,
            EventPayload::SendError(_) => EventKind::SendingError,
            EventPayload::Opened(_) => EventKind::Opened,
            EventPayload::Clicked(_) => EventKind::Clicked,
            EventPayload::Submitted(_) => EventKind::DataSubmit,
            EventPayload::Reported(_) => EventKind::Reported,
        }
    }

    /// Interaction metadata, if this kind of event carries any.
    pub fn interaction(&self) -> Option<&InteractionDetails> {
        match self {
            EventPayload::Opened(d)
            | EventPayload::Clicked(d)
            | EventPayload::Submitted(d)
            | EventPayload::Reported(d) => Some(d),
            EventPayload::Sent | EventPayload::SendError(_) => None,
        }
    }

    /// The `details` column value: `None` for payload-less events.
    pub fn details_json(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        match self {
            EventPayload::Sent => Ok(None),
            EventPayload::SendError(failure) => serde_json::to_value(failure).map(Some),
            EventPayload::Opened(d)
            | EventPayload::Clicked(d)
            | EventPayload::Submitted(d)
            | EventPayload::Reported(d) => serde_json::to_value(d).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_details_use_dashboard_field_names() {
        let details = InteractionDetails::new("203.0.113.7", "Mozilla/5.0")
            .with_field("username", "alice")
            .with_field("username", "alice2");
        let json = EventPayload::Submitted(details).details_json().unwrap();
        assert_eq!(
            json,
            Some(serde_json::json!({
                "payload": {"username": ["alice", "alice2"]},
                "browser": {"address": "203.0.113.7", "user-agent": "Mozilla/5.0"},
            }))
        );
    }

    #[test]
    fn sent_has_no_details_and_no_interaction() {
        assert_eq!(EventPayload::Sent.details_json().unwrap(), None);
        assert!(EventPayload::Sent.interaction().is_none());
    }

    #[test]
    fn send_error_details_carry_message() {
        let payload = EventPayload::SendError(SendFailure {
            error: "550 mailbox unavailable".into(),
        });
        assert_eq!(payload.kind(), EventKind::SendingError);
        assert_eq!(
            payload.details_json().unwrap(),
            Some(serde_json::json!({"error": "550 mailbox unavailable"}))
        );
    }

    #[test]
    fn missing_browser_fields_default_to_empty() {
        let details: InteractionDetails = serde_json::from_str(r#"{"payload": {}}"#).unwrap();
        assert_eq!(details.browser, BrowserInfo::default());
    }
}
