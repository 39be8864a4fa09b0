#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use lure_core::InteractionDetails;
use lure_storage::{MemoryStorage, Recipient};
use lure_tracker::{Clock, ResultTracker};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const T0: OffsetDateTime = datetime!(2025-03-01 9:00 UTC);

pub const HUMAN_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const PROXY_UA: &str = "Mozilla/5.0 (Windows NT 5.1; rv:11.0) Gecko Firefox/11.0 (via ggpht.com GoogleImageProxy)";

/// Clock the test moves by hand.
pub struct ManualClock(Mutex<OffsetDateTime>);

impl ManualClock {
    pub fn new(at: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(at)))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().unwrap()
    }
}

pub fn human() -> InteractionDetails {
    InteractionDetails::new("198.51.100.23", HUMAN_UA)
}

pub fn gateway() -> InteractionDetails {
    InteractionDetails::new("66.249.84.17", PROXY_UA)
}

/// A tracker over a fresh in-memory store, its clock, and one Result
/// already created in campaign 1.
pub async fn setup() -> (ResultTracker<MemoryStorage>, Arc<ManualClock>, String) {
    let clock = ManualClock::new(T0);
    let tracker =
        ResultTracker::new(Arc::new(MemoryStorage::new())).with_clock(clock.clone());
    let result = tracker
        .create_result(1, Recipient::new("alice@example.com"))
        .await
        .unwrap();
    (tracker, clock, result.rid)
}
