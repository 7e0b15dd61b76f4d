// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete Vigil pipeline.
//!
//! Each test runs a real worker pool against an isolated TestHarness (temp
//! SQLite, mock chat, classifier, and embedder). Tests are independent and
//! order-insensitive.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_core::{Incident, IncidentAction, JobKind, JobState, OnboardingStatus, VigilError};
use vigil_pipeline::{Collaborators, EventIntake, MessageIntake, build_worker_pool};
use vigil_storage::queries::{channels, incidents, jobs, messages};
use vigil_test_utils::{TestHarness, bot_message, ts, user_message};

const DEADLINE: Duration = Duration::from_secs(10);

async fn outage_harness() -> TestHarness {
    let mut h = TestHarness::builder()
        .with_rule("is down", IncidentAction::open("X", "down"))
        .with_rule("recovered", IncidentAction::close("X", "down"))
        .build()
        .await
        .unwrap();
    h.config.queue.poll_interval_ms = 10;
    // One classifier so messages are classified in arrival order.
    h.config.queue.workers.classify_message = 1;
    h
}

fn start_pool(h: &TestHarness) -> (CancellationToken, JoinHandle<Result<(), VigilError>>) {
    let collaborators = Collaborators {
        chat: h.chat.clone(),
        classifier: h.classifier.clone(),
        embedder: h.embedder.clone(),
    };
    let pool = build_worker_pool(&h.db, &h.config, &collaborators);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(pool.run(cancel.clone()));
    (cancel, handle)
}

async fn stop_pool(cancel: CancellationToken, handle: JoinHandle<Result<(), VigilError>>) {
    cancel.cancel();
    handle.await.unwrap().unwrap();
}

/// Poll the store until `channel_id` has `count` incidents, `open` of them
/// still open.
async fn wait_for_incidents(
    h: &TestHarness,
    channel_id: &str,
    count: usize,
    open: usize,
) -> Vec<Incident> {
    let start = Instant::now();
    loop {
        let found = incidents::list_incidents(&h.db, channel_id).await.unwrap();
        let still_open = found.iter().filter(|i| i.is_open()).count();
        if found.len() == count && still_open == open {
            return found;
        }
        assert!(
            start.elapsed() < DEADLINE,
            "expected {count} incident(s) with {open} open, found {found:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_idle_classification(h: &TestHarness) {
    let start = Instant::now();
    loop {
        let busy = jobs::list_jobs(&h.db, Some(JobKind::ClassifyMessage))
            .await
            .unwrap()
            .iter()
            .any(|j| matches!(j.state, JobState::Available | JobState::Running));
        if !busy {
            return;
        }
        assert!(start.elapsed() < DEADLINE, "classification did not drain");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---- Onboarding through incident tracking ----

#[tokio::test]
async fn test_new_channel_is_onboarded_and_outage_tracked() {
    let h = outage_harness().await;
    h.chat.set_channel_name("C1", "ops-alerts").await;
    h.chat
        .push_messages(
            "C1",
            vec![
                bot_message("1700000000.000100", "alertmanager", "service X is down"),
                user_message("1700000030.000000", "U1", "looking"),
                bot_message("1700000090.000200", "alertmanager", "service X recovered"),
            ],
        )
        .await;

    let intake = EventIntake::new(h.db.clone(), h.config.ingestion.onboard_last_n_msgs);
    assert!(intake.observe_channel("C1").await.unwrap());

    let (cancel, handle) = start_pool(&h);
    let found = wait_for_incidents(&h, "C1", 1, 0).await;
    wait_for_idle_classification(&h).await;
    stop_pool(cancel, handle).await;

    assert_eq!(found[0].service, "X");
    assert_eq!(found[0].duration_us, Some(90_000_100));

    let channel = channels::get_channel(&h.db, "C1").await.unwrap().unwrap();
    assert_eq!(channel.name.as_deref(), Some("ops-alerts"));
    assert_eq!(channel.onboarding, Some(OnboardingStatus::Finished));
    assert_eq!(channel.watermark, Some(ts("1700000090.000200")));

    let stored = messages::list_messages(&h.db, "C1").await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|m| m.embedding.is_some()));
    h.close().await.unwrap();
}

// ---- Live events ----

#[tokio::test]
async fn test_live_messages_open_and_close_incident() {
    let h = outage_harness().await;
    channels::add_channel(&h.db, "C1").await.unwrap();
    channels::set_onboarding(&h.db, "C1", OnboardingStatus::Finished)
        .await
        .unwrap();
    let intake = EventIntake::new(h.db.clone(), h.config.ingestion.onboard_last_n_msgs);

    let (cancel, handle) = start_pool(&h);

    let down = bot_message("1700000000.000100", "alertmanager", "service X is down");
    assert_eq!(
        intake.notify_message("C1", &down).await.unwrap(),
        MessageIntake::Stored
    );
    let opened = wait_for_incidents(&h, "C1", 1, 1).await;
    assert_eq!(opened[0].open_ts, ts("1700000000.000100"));

    let up = bot_message("1700000090.000200", "alertmanager", "service X recovered");
    intake.notify_message("C1", &up).await.unwrap();
    let closed = wait_for_incidents(&h, "C1", 1, 0).await;
    assert_eq!(closed[0].id, opened[0].id);
    assert_eq!(closed[0].close_ts, Some(ts("1700000090.000200")));

    wait_for_idle_classification(&h).await;
    stop_pool(cancel, handle).await;

    // A redelivered event changes nothing.
    assert_eq!(
        intake.notify_message("C1", &down).await.unwrap(),
        MessageIntake::Duplicate
    );
    assert_eq!(incidents::list_incidents(&h.db, "C1").await.unwrap().len(), 1);
    h.close().await.unwrap();
}

#[tokio::test]
async fn test_reactions_survive_classification() {
    let h = outage_harness().await;
    channels::add_channel(&h.db, "C1").await.unwrap();
    channels::set_onboarding(&h.db, "C1", OnboardingStatus::Finished)
        .await
        .unwrap();
    let intake = EventIntake::new(h.db.clone(), h.config.ingestion.onboard_last_n_msgs);

    let down = bot_message("1700000000.000100", "alertmanager", "service X is down");
    intake.notify_message("C1", &down).await.unwrap();
    assert!(
        intake
            .notify_reaction("C1", &down.ts, "eyes", true)
            .await
            .unwrap()
    );

    let (cancel, handle) = start_pool(&h);
    wait_for_incidents(&h, "C1", 1, 1).await;
    wait_for_idle_classification(&h).await;
    stop_pool(cancel, handle).await;

    let stored = messages::get_message(&h.db, "C1", &down.ts)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.attrs.v1().reactions.get("eyes"), Some(&1));
    assert!(stored.attrs.v1().incident.is_some());
    h.close().await.unwrap();
}

// ---- Shutdown ----

#[tokio::test]
async fn test_pool_stops_promptly_when_idle() {
    let h = outage_harness().await;
    let (cancel, handle) = start_pool(&h);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    stop_pool(cancel, handle).await;
    assert!(start.elapsed() < Duration::from_secs(5));
    h.close().await.unwrap();
}
