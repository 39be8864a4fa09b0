use serde::{Deserialize, Serialize};

use crate::status::EventKind;

/// What a screened (gateway-classified) event is allowed to do.
///
/// Screened events are always written to the log with `is_screened = true`;
/// the policy only governs whether they may move the Result's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningPolicy {
    /// The verdict is recorded and reported in statistics; transitions are
    /// unaffected.
    #[default]
    Informational,
    /// Screened opens and clicks do not change status. Form submissions and
    /// reports always apply.
    Suppress,
}

impl ScreeningPolicy {
    /// Whether a screened event of `kind` is withheld from the status
    /// machine.
    pub fn suppresses(self, kind: EventKind) -> bool {
        match self {
            ScreeningPolicy::Informational => false,
            ScreeningPolicy::Suppress => matches!(kind, EventKind::Opened | EventKind::Clicked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn informational_never_suppresses() {
        for kind in [
            EventKind::Opened,
            EventKind::Clicked,
            EventKind::DataSubmit,
            EventKind::Reported,
        ] {
            assert!(!ScreeningPolicy::Informational.suppresses(kind));
        }
    }

    #[test]
    fn suppress_only_withholds_opens_and_clicks() {
        assert!(ScreeningPolicy::Suppress.suppresses(EventKind::Opened));
        assert!(ScreeningPolicy::Suppress.suppresses(EventKind::Clicked));
        assert!(!ScreeningPolicy::Suppress.suppresses(EventKind::DataSubmit));
        assert!(!ScreeningPolicy::Suppress.suppresses(EventKind::Reported));
    }

    #[test]
    fn parses_from_config_string() {
        let p: ScreeningPolicy = serde_json::from_str("\"suppress\"").unwrap();
        assert_eq!(p, ScreeningPolicy::Suppress);
        assert_eq!(ScreeningPolicy::default(), ScreeningPolicy::Informational);
    }
}
