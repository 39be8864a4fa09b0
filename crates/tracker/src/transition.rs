//! Status transition rules.
//!
//! Pure functions over a [`ResultRecord`]; the tracker wraps them in a
//! storage snapshot. A transition that would lower the Result in the
//! precedence chain leaves it untouched.

use lure_core::{EventKind, ScreeningPolicy, Status};
use lure_storage::ResultRecord;
use time::OffsetDateTime;

/// The state change requested by one tracker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Sent,
    Error,
    /// Transient send failure; the send is retried at `send_date`.
    Backoff {
        send_date: OffsetDateTime,
    },
    Opened,
    Clicked,
    Submitted,
    Reported,
}

impl Transition {
    /// The kind of event this transition is recorded as.
    pub fn event_kind(self) -> EventKind {
        match self {
            Transition::Sent => EventKind::Sent,
            Transition::Error | Transition::Backoff { .. } => EventKind::SendingError,
            Transition::Opened => EventKind::Opened,
            Transition::Clicked => EventKind::Clicked,
            Transition::Submitted => EventKind::DataSubmit,
            Transition::Reported => EventKind::Reported,
        }
    }

    /// Whether the transition is allowed from `current`.
    pub fn permitted_from(self, current: Status) -> bool {
        match self {
            Transition::Sent => !current.reached(Status::Opened),
            Transition::Opened => !current.reached(Status::Clicked),
            Transition::Clicked => current != Status::DataSubmit,
            Transition::Error
            | Transition::Backoff { .. }
            | Transition::Submitted
            | Transition::Reported => true,
        }
    }
}

/// Apply `transition` to `result` as of `at`.
///
/// Returns `true` if the result was modified. A screened event that the
/// policy suppresses, or a transition not permitted from the current
/// status, leaves `result` exactly as it was.
pub fn apply(
    result: &mut ResultRecord,
    transition: Transition,
    at: OffsetDateTime,
    screened: bool,
    policy: ScreeningPolicy,
) -> bool {
    if screened && policy.suppresses(transition.event_kind()) {
        return false;
    }
    if !transition.permitted_from(result.status) {
        return false;
    }

    match transition {
        Transition::Sent => {
            result.status = Status::Sent;
            result.send_date = at;
        }
        Transition::Error => result.status = Status::Error,
        Transition::Backoff { send_date } => {
            result.status = Status::Retry;
            result.send_date = send_date;
        }
        Transition::Opened => result.status = Status::Opened,
        Transition::Clicked => result.status = Status::Clicked,
        Transition::Submitted => result.status = Status::DataSubmit,
        Transition::Reported => result.reported = true,
    }
    result.modified_date = at;
    true
}
