//! The result state machine.
//!
//! Every operation follows the same shape:
//!
//! 1. serialize and classify the event payload (no storage access yet),
//! 2. begin a snapshot and lock the Result,
//! 3. append the Event,
//! 4. apply the transition and save the Result if it changed,
//! 5. commit.
//!
//! Any failure after step 2 aborts the snapshot, so an Event is never
//! written without its Result update and vice versa.

use std::sync::Arc;

use lure_core::{
    generate_rid, EventPayload, GatewayClassifier, HitClassifier, InteractionDetails,
    ScreeningPolicy, SendFailure, Status,
};
use lure_storage::{
    EventRecord, NewEvent, NewResult, Recipient, ResultRecord, StorageError, TrackingStorage,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::TrackerError;
use crate::geo::{GeoLocator, NoGeoLocator};
use crate::stats::CampaignStats;
use crate::transition::{self, Transition};

/// Source of event timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// What an operation committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// The Result after the operation.
    pub result: ResultRecord,
    /// The Event appended by the operation.
    pub event: NewEvent,
    /// Whether the Result itself was modified.
    pub transitioned: bool,
}

impl Outcome {
    /// Whether the hit's source address may stand in for the recipient's
    /// location: the hit was not screened, and it either moved the Result or
    /// the Result has no address yet.
    pub fn locates_recipient(&self) -> bool {
        !self.event.is_screened && (self.transitioned || self.result.ip.is_empty())
    }
}

/// Records interactions against Results stored in `S`.
pub struct ResultTracker<S> {
    storage: Arc<S>,
    classifier: Arc<dyn HitClassifier>,
    policy: ScreeningPolicy,
    geo: Arc<dyn GeoLocator>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for ResultTracker<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            classifier: Arc::clone(&self.classifier),
            policy: self.policy,
            geo: Arc::clone(&self.geo),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: TrackingStorage> ResultTracker<S> {
    /// Tracker with the default gateway classifier, informational screening
    /// and no geo enrichment.
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            classifier: Arc::new(GatewayClassifier::default()),
            policy: ScreeningPolicy::default(),
            geo: Arc::new(NoGeoLocator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn HitClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_policy(mut self, policy: ScreeningPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLocator>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn policy(&self) -> ScreeningPolicy {
        self.policy
    }

    // ── Identifier allocation ─────────────────────────────────────────────

    /// Create a Result at `Scheduled` for `recipient`, under a fresh `rid`.
    ///
    /// Regenerates the identifier for as long as it collides, either with a
    /// committed Result or with a concurrent insert that won the race at
    /// commit.
    pub async fn create_result(
        &self,
        campaign_id: i64,
        recipient: Recipient,
    ) -> Result<ResultRecord, TrackerError> {
        loop {
            let rid = generate_rid()?;
            if self.storage.result_exists(&rid).await? {
                tracing::debug!(%rid, "result id collision, regenerating");
                continue;
            }

            let now = self.clock.now();
            let new_result = NewResult {
                campaign_id,
                rid: rid.clone(),
                recipient: recipient.clone(),
                status: Status::Scheduled,
                send_date: now,
                modified_date: now,
            };

            let mut snapshot = self.storage.begin_snapshot().await?;
            let inserted = match self.storage.insert_result(&mut snapshot, new_result).await {
                Ok(record) => record,
                Err(e) => {
                    let _ = self.storage.abort_snapshot(snapshot).await;
                    if is_duplicate(&e) {
                        tracing::debug!(%rid, "result id taken at insert, regenerating");
                        continue;
                    }
                    return Err(e.into());
                }
            };
            match self.storage.commit_snapshot(snapshot).await {
                Ok(()) => {
                    tracing::info!(%rid, campaign_id, "result created");
                    return Ok(inserted);
                }
                Err(e) if is_duplicate(&e) => {
                    tracing::debug!(%rid, "result id taken at commit, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Send subsystem callbacks ──────────────────────────────────────────

    /// The email was accepted by the mail server.
    pub async fn email_sent(&self, rid: &str) -> Result<Outcome, TrackerError> {
        self.record(rid, EventPayload::Sent, Transition::Sent).await
    }

    /// Permanent send failure.
    pub async fn email_error(&self, rid: &str, error: &str) -> Result<Outcome, TrackerError> {
        let payload = EventPayload::SendError(SendFailure {
            error: error.to_string(),
        });
        self.record(rid, payload, Transition::Error).await
    }

    /// Transient send failure; the send is retried at `send_date`.
    pub async fn email_backoff(
        &self,
        rid: &str,
        error: &str,
        send_date: OffsetDateTime,
    ) -> Result<Outcome, TrackerError> {
        let payload = EventPayload::SendError(SendFailure {
            error: error.to_string(),
        });
        self.record(rid, payload, Transition::Backoff { send_date })
            .await
    }

    // ── Recipient interactions ────────────────────────────────────────────

    pub async fn email_opened(
        &self,
        rid: &str,
        details: InteractionDetails,
    ) -> Result<Outcome, TrackerError> {
        self.record(rid, EventPayload::Opened(details), Transition::Opened)
            .await
    }

    pub async fn clicked_link(
        &self,
        rid: &str,
        details: InteractionDetails,
    ) -> Result<Outcome, TrackerError> {
        self.record(rid, EventPayload::Clicked(details), Transition::Clicked)
            .await
    }

    pub async fn form_submit(
        &self,
        rid: &str,
        details: InteractionDetails,
    ) -> Result<Outcome, TrackerError> {
        self.record(rid, EventPayload::Submitted(details), Transition::Submitted)
            .await
    }

    pub async fn email_report(
        &self,
        rid: &str,
        details: InteractionDetails,
    ) -> Result<Outcome, TrackerError> {
        self.record(rid, EventPayload::Reported(details), Transition::Reported)
            .await
    }

    // ── Enrichment ────────────────────────────────────────────────────────

    /// Geo-enrich the Result an interaction touched, from that interaction's
    /// source address. Returns `None` without touching storage when the hit
    /// does not locate the recipient (see [`Outcome::locates_recipient`]),
    /// so gateway scans never overwrite a recorded location.
    pub async fn locate(
        &self,
        outcome: &Outcome,
        ip: &str,
    ) -> Result<Option<ResultRecord>, TrackerError> {
        if !outcome.locates_recipient() {
            tracing::debug!(
                rid = %outcome.result.rid,
                screened = outcome.event.is_screened,
                "hit not used for geo enrichment"
            );
            return Ok(None);
        }
        self.update_geo(&outcome.result.rid, ip).await.map(Some)
    }

    /// Record the source address of a Result and, when known, its location.
    ///
    /// Lookup failures are logged and the Result is returned unchanged.
    pub async fn update_geo(&self, rid: &str, ip: &str) -> Result<ResultRecord, TrackerError> {
        let coordinates = match self.geo.lookup(ip) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(%rid, ip, error = %err, "geo lookup failed");
                return Ok(self.storage.get_result(rid).await?);
            }
        };

        let mut snapshot = self.storage.begin_snapshot().await?;
        let current = match self.storage.get_result_for_update(&mut snapshot, rid).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };

        let mut next = current.clone();
        next.ip = ip.to_string();
        if let Some(c) = coordinates {
            next.latitude = c.latitude;
            next.longitude = c.longitude;
        }
        if next == current {
            self.storage.abort_snapshot(snapshot).await?;
            return Ok(current);
        }

        match self.storage.save_result(&mut snapshot, &next).await {
            Ok(version) => next.version = version,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        }
        self.storage.commit_snapshot(snapshot).await?;
        tracing::debug!(%rid, ip, located = coordinates.is_some(), "result geo updated");
        Ok(next)
    }

    // ── Reporting ─────────────────────────────────────────────────────────

    pub async fn campaign_stats(&self, campaign_id: i64) -> Result<CampaignStats, TrackerError> {
        let results = self.storage.list_results(campaign_id).await?;
        let events = self.storage.list_events(campaign_id).await?;
        Ok(CampaignStats::summarize(&results, &events))
    }

    /// The campaign's events in append order.
    pub async fn campaign_timeline(
        &self,
        campaign_id: i64,
    ) -> Result<Vec<EventRecord>, TrackerError> {
        Ok(self.storage.list_events(campaign_id).await?)
    }

    pub async fn result(&self, rid: &str) -> Result<ResultRecord, TrackerError> {
        Ok(self.storage.get_result(rid).await?)
    }

    pub async fn results(&self, campaign_id: i64) -> Result<Vec<ResultRecord>, TrackerError> {
        Ok(self.storage.list_results(campaign_id).await?)
    }

    // ── Core ──────────────────────────────────────────────────────────────

    async fn record(
        &self,
        rid: &str,
        payload: EventPayload,
        transition: Transition,
    ) -> Result<Outcome, TrackerError> {
        let kind = payload.kind();
        let details = payload.details_json()?;
        let is_screened = payload
            .interaction()
            .is_some_and(|d| self.classifier.classify(d));

        let mut snapshot = self.storage.begin_snapshot().await?;
        let current = match self.storage.get_result_for_update(&mut snapshot, rid).await {
            Ok(r) => r,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };

        // Event time never precedes the Result's last modification.
        let at = self.clock.now().max(current.modified_date);
        let event = NewEvent {
            campaign_id: current.campaign_id,
            rid: current.rid.clone(),
            email: current.recipient.email.clone(),
            time: at,
            kind,
            details,
            is_screened,
        };
        if let Err(e) = self.storage.append_event(&mut snapshot, event.clone()).await {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }

        let mut next = current.clone();
        let transitioned = transition::apply(&mut next, transition, at, is_screened, self.policy);
        if transitioned {
            match self.storage.save_result(&mut snapshot, &next).await {
                Ok(version) => next.version = version,
                Err(e) => {
                    let _ = self.storage.abort_snapshot(snapshot).await;
                    return Err(e.into());
                }
            }
        }

        self.storage.commit_snapshot(snapshot).await?;

        if is_screened {
            tracing::info!(%rid, kind = %kind, policy = ?self.policy, "gateway hit recorded");
        }
        if transitioned {
            tracing::debug!(%rid, from = %current.status, to = %next.status, "result updated");
        } else {
            tracing::debug!(%rid, kind = %kind, status = %current.status, "event recorded without transition");
        }

        Ok(Outcome {
            result: next,
            event,
            transitioned,
        })
    }
}

fn is_duplicate(e: &StorageError) -> bool {
    matches!(e, StorageError::DuplicateResultId { .. })
}
