//! Campaign statistics with real and screened engagement kept apart.

use std::collections::HashSet;

use lure_core::{EventKind, Status};
use lure_storage::{EventRecord, ResultRecord};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignStats {
    pub total: usize,
    pub sent: usize,
    pub opened_real: usize,
    pub opened_screened: usize,
    pub clicked_real: usize,
    pub clicked_screened: usize,
    pub submitted_data: usize,
    pub email_reported: usize,
    pub error: usize,
}

impl CampaignStats {
    /// Count a campaign's results against its event log.
    ///
    /// A result at Opened or higher counts as a real open if any unscreened
    /// Opened, Clicked or DataSubmit event exists for it; otherwise its opens
    /// were all gateway traffic. Clicks are split the same way over Clicked
    /// and DataSubmit events.
    pub fn summarize(results: &[ResultRecord], events: &[EventRecord]) -> Self {
        let mut human_open: HashSet<&str> = HashSet::new();
        let mut human_click: HashSet<&str> = HashSet::new();
        for event in events.iter().filter(|e| !e.is_screened) {
            match event.kind {
                EventKind::Opened => {
                    human_open.insert(&event.rid);
                }
                EventKind::Clicked | EventKind::DataSubmit => {
                    human_open.insert(&event.rid);
                    human_click.insert(&event.rid);
                }
                _ => {}
            }
        }

        let mut stats = CampaignStats {
            total: results.len(),
            ..Self::default()
        };
        for r in results {
            let rid = r.rid.as_str();
            if r.status.reached(Status::Sent) {
                stats.sent += 1;
            }
            if r.status.reached(Status::Opened) {
                if human_open.contains(rid) {
                    stats.opened_real += 1;
                } else {
                    stats.opened_screened += 1;
                }
            }
            if r.status.reached(Status::Clicked) {
                if human_click.contains(rid) {
                    stats.clicked_real += 1;
                } else {
                    stats.clicked_screened += 1;
                }
            }
            if r.status == Status::DataSubmit {
                stats.submitted_data += 1;
            }
            if r.reported {
                stats.email_reported += 1;
            }
            if r.status == Status::Error {
                stats.error += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use lure_storage::Recipient;
    use time::macros::datetime;

    use super::*;

    fn result(rid: &str, status: Status, reported: bool) -> ResultRecord {
        ResultRecord {
            id: 0,
            campaign_id: 1,
            rid: rid.to_string(),
            recipient: Recipient::new(format!("{rid}@example.com")),
            status,
            reported,
            ip: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            send_date: datetime!(2025-01-01 0:00 UTC),
            modified_date: datetime!(2025-01-01 0:00 UTC),
            version: 0,
        }
    }

    fn event(rid: &str, kind: EventKind, is_screened: bool) -> EventRecord {
        EventRecord {
            id: 0,
            campaign_id: 1,
            rid: rid.to_string(),
            email: format!("{rid}@example.com"),
            time: datetime!(2025-01-01 0:00 UTC),
            kind,
            details: None,
            is_screened,
        }
    }

    #[test]
    fn screened_only_engagement_is_split_out() {
        let results = vec![
            result("human01", Status::Opened, false),
            result("proxy01", Status::Opened, false),
            result("scanr01", Status::Clicked, false),
            result("human02", Status::DataSubmit, true),
        ];
        let events = vec![
            event("human01", EventKind::Opened, false),
            event("proxy01", EventKind::Opened, true),
            event("scanr01", EventKind::Opened, true),
            event("scanr01", EventKind::Clicked, true),
            event("human02", EventKind::Clicked, true),
            event("human02", EventKind::DataSubmit, false),
        ];
        let stats = CampaignStats::summarize(&results, &events);
        assert_eq!(
            stats,
            CampaignStats {
                total: 4,
                sent: 4,
                opened_real: 2,
                opened_screened: 2,
                clicked_real: 1,
                clicked_screened: 1,
                submitted_data: 1,
                email_reported: 1,
                error: 0,
            }
        );
    }

    #[test]
    fn statuses_outside_chain_only_count_in_total_and_error() {
        let results = vec![
            result("schd001", Status::Scheduled, false),
            result("retry01", Status::Retry, false),
            result("error01", Status::Error, false),
        ];
        let stats = CampaignStats::summarize(&results, &[]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.error, 1);
    }
}
