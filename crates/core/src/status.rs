//! Result statuses and event kinds.
//!
//! Both enums serialize to the human-readable strings stored in the results
//! and events tables (e.g. `"Clicked Link"`), so dumps and API responses stay
//! readable by the dashboard.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current status of a Result.
///
/// `Sent`, `Opened`, `Clicked` and `DataSubmit` form the precedence chain
/// (see [`Status::rank`]). `Scheduled`, `Error` and `Retry` sit outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Scheduled")]
    Scheduled,
    #[serde(rename = "Email Sent")]
    Sent,
    #[serde(rename = "Email Opened")]
    Opened,
    #[serde(rename = "Clicked Link")]
    Clicked,
    #[serde(rename = "Submitted Data")]
    DataSubmit,
    #[serde(rename = "Error")]
    Error,
    #[serde(rename = "Retrying")]
    Retry,
}

impl Status {
    /// All statuses, in declaration order.
    pub const ALL: [Status; 7] = [
        Status::Scheduled,
        Status::Sent,
        Status::Opened,
        Status::Clicked,
        Status::DataSubmit,
        Status::Error,
        Status::Retry,
    ];

    /// The precedence chain, lowest first.
    pub const CHAIN: [Status; 4] = [
        Status::Sent,
        Status::Opened,
        Status::Clicked,
        Status::DataSubmit,
    ];

    /// Position in the precedence chain, or `None` for statuses outside it.
    pub fn rank(self) -> Option<u8> {
        match self {
            Status::Sent => Some(0),
            Status::Opened => Some(1),
            Status::Clicked => Some(2),
            Status::DataSubmit => Some(3),
            Status::Scheduled | Status::Error | Status::Retry => None,
        }
    }

    /// True if `self` is in the chain and ranks strictly above `other`.
    ///
    /// Statuses outside the chain never outrank anything, and are never
    /// outranked.
    pub fn outranks(self, other: Status) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// True if the status is `at_least` or higher in the chain.
    pub fn reached(self, at_least: Status) -> bool {
        match (self.rank(), at_least.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Scheduled => "Scheduled",
            Status::Sent => "Email Sent",
            Status::Opened => "Email Opened",
            Status::Clicked => "Clicked Link",
            Status::DataSubmit => "Submitted Data",
            Status::Error => "Error",
            Status::Retry => "Retrying",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `kind` tag of an Event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Email Sent")]
    Sent,
    #[serde(rename = "Error Sending Email")]
    SendingError,
    #[serde(rename = "Email Opened")]
    Opened,
    #[serde(rename = "Clicked Link")]
    Clicked,
    #[serde(rename = "Submitted Data")]
    DataSubmit,
    #[serde(rename = "Email Reported")]
    Reported,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Sent => "Email Sent",
            EventKind::SendingError => "Error Sending Email",
            EventKind::Opened => "Email Opened",
            EventKind::Clicked => "Clicked Link",
            EventKind::DataSubmit => "Submitted Data",
            EventKind::Reported => "Email Reported",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
