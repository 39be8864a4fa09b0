mod common;

use std::sync::Arc;

use lure_core::{EventKind, ScreeningPolicy, Status};
use lure_core::InteractionDetails;
use lure_storage::{MemoryStorage, Recipient};
use lure_tracker::{
    CampaignStats, Coordinates, GeoEntry, GeoError, GeoLocator, ResultTracker, StaticGeoTable,
};

use common::{gateway, human, setup};

fn london_table() -> Arc<StaticGeoTable> {
    Arc::new(StaticGeoTable::new(vec![GeoEntry {
        cidr: "198.51.100.0/24".parse().unwrap(),
        latitude: 51.5074,
        longitude: -0.1278,
    }]))
}

/// London for the human range, Mountain View for the scanner range.
fn two_site_table() -> Arc<StaticGeoTable> {
    Arc::new(StaticGeoTable::new(vec![
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
    ]))
}

struct BrokenLocator;

impl GeoLocator for BrokenLocator {
    fn lookup(&self, _ip: &str) -> Result<Option<Coordinates>, GeoError> {
        Err(GeoError::Lookup("database unavailable".to_string()))
    }
}

#[tokio::test]
async fn known_address_sets_ip_and_coordinates() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(london_table());
    let r = tracker.update_geo(&rid, "198.51.100.23").await.unwrap();
    assert_eq!(r.ip, "198.51.100.23");
    assert_eq!(r.latitude, 51.5074);
    assert_eq!(r.longitude, -0.1278);
    assert_eq!(r, tracker.result(&rid).await.unwrap());
}

#[tokio::test]
async fn unknown_address_records_ip_only() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(london_table());
    let r = tracker.update_geo(&rid, "203.0.113.5").await.unwrap();
    assert_eq!(r.ip, "203.0.113.5");
    assert_eq!((r.latitude, r.longitude), (0.0, 0.0));
}

#[tokio::test]
async fn lookup_error_is_swallowed() {
    let (tracker, _clock, rid) = setup().await;
    let before = tracker.result(&rid).await.unwrap();
    let tracker = tracker.with_geo(Arc::new(BrokenLocator));
    let r = tracker.update_geo(&rid, "198.51.100.23").await.unwrap();
    assert_eq!(r, before);
}

#[tokio::test]
async fn malformed_address_leaves_result_untouched() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(london_table());
    let before = tracker.result(&rid).await.unwrap();
    let r = tracker.update_geo(&rid, "not an ip").await.unwrap();
    assert_eq!(r, before);
}

#[tokio::test]
async fn geo_update_does_not_touch_status_or_events() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(london_table());
    tracker.clicked_link(&rid, human()).await.unwrap();
    let r = tracker.update_geo(&rid, "198.51.100.23").await.unwrap();
    assert_eq!(r.status, Status::Clicked);
    assert_eq!(tracker.campaign_timeline(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_geo_update_is_a_no_op() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(london_table());
    let first = tracker.update_geo(&rid, "198.51.100.23").await.unwrap();
    let second = tracker.update_geo(&rid, "198.51.100.23").await.unwrap();
    assert_eq!(first.version, second.version);
}

#[tokio::test]
async fn stats_separate_gateway_engagement() {
    let tracker = ResultTracker::new(Arc::new(MemoryStorage::new()));
    let mut rids = Vec::new();
    for name in ["alice", "bob", "carol", "dave", "erin"] {
        let r = tracker
            .create_result(7, Recipient::new(format!("{name}@example.com")))
            .await
            .unwrap();
        tracker.email_sent(&r.rid).await.unwrap();
        rids.push(r.rid);
    }

    // alice: human open; bob: only the gateway opened it; carol: scanner
    // clicked, then a human clicked; dave: submitted; erin: bounced, reported.
    tracker.email_opened(&rids[0], human()).await.unwrap();
    tracker.email_opened(&rids[1], gateway()).await.unwrap();
    tracker.clicked_link(&rids[2], gateway()).await.unwrap();
    tracker.clicked_link(&rids[2], human()).await.unwrap();
    tracker.form_submit(&rids[3], human()).await.unwrap();
    tracker.email_error(&rids[4], "550 no such user").await.unwrap();
    tracker.email_report(&rids[4], human()).await.unwrap();

    let stats = tracker.campaign_stats(7).await.unwrap();
    assert_eq!(
        stats,
        CampaignStats {
            total: 5,
            sent: 4,
            opened_real: 3,
            opened_screened: 1,
            clicked_real: 2,
            clicked_screened: 0,
            submitted_data: 1,
            email_reported: 1,
            error: 1,
        }
    );
}

#[tokio::test]
async fn timeline_is_in_append_order() {
    let (tracker, _clock, rid) = setup().await;
    tracker.email_sent(&rid).await.unwrap();
    tracker.email_opened(&rid, gateway()).await.unwrap();
    tracker.clicked_link(&rid, human()).await.unwrap();

    let timeline = tracker.campaign_timeline(1).await.unwrap();
    let kinds: Vec<(EventKind, bool)> = timeline.iter().map(|e| (e.kind, e.is_screened)).collect();
    assert_eq!(
        kinds,
        [
            (EventKind::Sent, false),
            (EventKind::Opened, true),
            (EventKind::Clicked, false),
        ]
    );
    assert!(tracker.campaign_timeline(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn screened_hit_after_human_click_keeps_location() {
    for policy in [ScreeningPolicy::Suppress, ScreeningPolicy::Informational] {
        let (tracker, _clock, rid) = setup().await;
        let tracker = tracker.with_geo(two_site_table()).with_policy(policy);

        let click = tracker.clicked_link(&rid, human()).await.unwrap();
        let located = tracker.locate(&click, "198.51.100.23").await.unwrap();
        assert_eq!(located.map(|r| r.ip).as_deref(), Some("198.51.100.23"));

        let scan = tracker.email_opened(&rid, gateway()).await.unwrap();
        assert!(scan.event.is_screened);
        assert_eq!(tracker.locate(&scan, "66.249.84.17").await.unwrap(), None);

        let r = tracker.result(&rid).await.unwrap();
        assert_eq!(r.status, Status::Clicked, "{policy:?}");
        assert_eq!(r.ip, "198.51.100.23", "{policy:?}");
        assert_eq!((r.latitude, r.longitude), (51.5, -0.1), "{policy:?}");
    }
}

#[tokio::test]
async fn screened_hit_never_sets_first_location() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(two_site_table());
    let scan = tracker.email_opened(&rid, gateway()).await.unwrap();
    // Informational policy: the scan moves the status but not the location.
    assert!(scan.transitioned);
    assert_eq!(tracker.locate(&scan, "66.249.84.17").await.unwrap(), None);
    assert_eq!(tracker.result(&rid).await.unwrap().ip, "");
}

#[tokio::test]
async fn human_hit_below_status_fills_missing_location_only() {
    let (tracker, _clock, rid) = setup().await;
    let tracker = tracker.with_geo(two_site_table());
    tracker.clicked_link(&rid, gateway()).await.unwrap();

    // The human's open ranks below Clicked but no address is recorded yet.
    let open = tracker.email_opened(&rid, human()).await.unwrap();
    assert!(!open.transitioned);
    let r = tracker.locate(&open, "198.51.100.23").await.unwrap().unwrap();
    assert_eq!(r.ip, "198.51.100.23");

    // A later stale open from elsewhere does not replace it.
    let stale = tracker
        .email_opened(&rid, InteractionDetails::new("198.51.100.99", common::HUMAN_UA))
        .await
        .unwrap();
    assert_eq!(tracker.locate(&stale, "198.51.100.99").await.unwrap(), None);
    assert_eq!(tracker.result(&rid).await.unwrap().ip, "198.51.100.23");
}
