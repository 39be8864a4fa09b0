use std::future::Future;

use lure_core::EventKind;

use super::{make_event, seed_result, TestResult};
use crate::TrackingStorage;

pub(super) async fn run_event_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "events",
        "events_listed_in_append_order",
        events_listed_in_append_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "event_ids_increase_across_snapshots",
        event_ids_increase_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "list_events_filters_by_campaign",
        list_events_filters_by_campaign(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "list_result_events_filters_by_rid",
        list_result_events_filters_by_rid(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "event_fields_round_trip",
        event_fields_round_trip(factory).await,
    ));

    results
}

async fn append<S: TrackingStorage>(
    s: &S,
    rid: &str,
    campaign_id: i64,
    kinds: &[EventKind],
) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for kind in kinds {
        s.append_event(&mut snap, make_event(rid, campaign_id, *kind))
            .await
            .map_err(|e| format!("append {kind}: {e}"))?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())
}

async fn events_listed_in_append_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let kinds = [
        EventKind::Sent,
        EventKind::Opened,
        EventKind::Opened,
        EventKind::Clicked,
        EventKind::DataSubmit,
    ];
    append(&s, "aaaaaaa", 1, &kinds).await?;

    let listed: Vec<EventKind> = s
        .list_events(1)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|e| e.kind)
        .collect();
    if listed != kinds {
        return Err(format!("expected {kinds:?}, got {listed:?}"));
    }
    Ok(())
}

async fn event_ids_increase_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    append(&s, "aaaaaaa", 1, &[EventKind::Sent]).await?;
    append(&s, "aaaaaaa", 1, &[EventKind::Opened, EventKind::Clicked]).await?;
    append(&s, "aaaaaaa", 1, &[EventKind::Reported]).await?;

    let events = s.list_events(1).await.map_err(|e| e.to_string())?;
    if events.len() != 4 {
        return Err(format!("expected 4 events, got {}", events.len()));
    }
    for pair in events.windows(2) {
        if pair[0].id >= pair[1].id {
            return Err(format!(
                "event ids not increasing: {} then {}",
                pair[0].id, pair[1].id
            ));
        }
    }
    Ok(())
}

async fn list_events_filters_by_campaign<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    seed_result(&s, "bbbbbbb", 2).await?;
    append(&s, "aaaaaaa", 1, &[EventKind::Sent]).await?;
    append(&s, "bbbbbbb", 2, &[EventKind::Sent, EventKind::Opened]).await?;

    let one = s.list_events(1).await.map_err(|e| e.to_string())?;
    let two = s.list_events(2).await.map_err(|e| e.to_string())?;
    if one.len() != 1 || two.len() != 2 {
        return Err(format!(
            "expected 1 and 2 events, got {} and {}",
            one.len(),
            two.len()
        ));
    }
    if two.iter().any(|e| e.campaign_id != 2) {
        return Err("campaign filter leaked events".to_string());
    }
    Ok(())
}

async fn list_result_events_filters_by_rid<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    seed_result(&s, "bbbbbbb", 1).await?;
    append(&s, "aaaaaaa", 1, &[EventKind::Sent]).await?;
    append(&s, "bbbbbbb", 1, &[EventKind::Sent]).await?;
    append(&s, "aaaaaaa", 1, &[EventKind::Opened]).await?;

    let own = s
        .list_result_events("aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    let kinds: Vec<EventKind> = own.iter().map(|e| e.kind).collect();
    if kinds != [EventKind::Sent, EventKind::Opened] {
        return Err(format!("expected [Sent, Opened], got {kinds:?}"));
    }
    if own.iter().any(|e| e.rid != "aaaaaaa") {
        return Err("rid filter leaked events".to_string());
    }
    Ok(())
}

async fn event_fields_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let mut event = make_event("aaaaaaa", 1, EventKind::Opened);
    event.is_screened = true;
    let expected_details = event.details.clone();
    let expected_time = event.time;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_event(&mut snap, event)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s
        .list_result_events("aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    let [stored] = stored.as_slice() else {
        return Err(format!("expected 1 event, got {}", stored.len()));
    };
    if !stored.is_screened {
        return Err("is_screened flag lost".to_string());
    }
    if stored.details != expected_details || stored.time != expected_time {
        return Err(format!("event fields changed: {stored:?}"));
    }
    if stored.email != "aaaaaaa@example.com" || stored.kind != EventKind::Opened {
        return Err(format!("identity fields changed: {stored:?}"));
    }
    Ok(())
}
