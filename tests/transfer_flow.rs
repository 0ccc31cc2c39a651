//! End-to-end transfer through the real pool over in-memory streams.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use vanity_swapper::config::TransferPlan;
use vanity_swapper::protocol::{RequestRecord, encode_vanity_patch};
use vanity_swapper::transfer::{RunOutcome, Session, TransferOptions};

use common::{
    MemoryConnector, RecordingConnector, RecordingNotifier, SOURCE_GUILD, TARGET_GUILD, plan,
    pool_options,
};

fn records(plan: &TransferPlan) -> (RequestRecord, RequestRecord) {
    let release = encode_vanity_patch(
        "api.test",
        &plan.source_resource_id,
        &plan.temp_alias,
        &plan.source_credential,
        &plan.source_mfa_credential,
    );
    let claim = encode_vanity_patch(
        "api.test",
        &plan.target_resource_id,
        &plan.final_alias,
        &plan.target_credential,
        &plan.target_mfa_credential,
    );
    (release, claim)
}

#[tokio::test(start_paused = true)]
async fn release_then_claim_flood_reaches_every_connection() {
    let connector = MemoryConnector::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let (release, claim) = records(&plan());

    let session = Session::start(
        plan(),
        pool_options(4),
        TransferOptions::new(),
        connector.clone(),
        notifier.clone(),
    )
    .unwrap();

    let outcome = session.run_with_grace(std::future::pending()).await;
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected completed run, got {outcome:?}");
    };

    assert_eq!(report.pool_size, 4);
    assert_eq!(report.release_writes, 2);
    assert_eq!(report.claim_writes, 24);
    assert_eq!(report.claim_rounds, 6);

    session.shutdown().await;

    let peers = connector.take_peers();
    assert_eq!(peers.len(), 4);

    let claims = claim.as_bytes().repeat(6);
    let mut release_then_claims = release.as_bytes().to_vec();
    release_then_claims.extend_from_slice(&claims);

    let mut with_release = 0;
    for mut peer in peers {
        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();

        if received == release_then_claims {
            with_release += 1;
        } else {
            assert_eq!(received, claims);
        }
    }
    assert_eq!(with_release, 2);

    let events = notifier.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alias.as_str(), "cool");
    assert!(events[0].success);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_writes_nothing() {
    let connector = MemoryConnector::new();
    let notifier = Arc::new(RecordingNotifier::default());

    let session = Session::start(
        plan(),
        pool_options(2),
        TransferOptions::new(),
        connector.clone(),
        notifier.clone(),
    )
    .unwrap();
    session
        .pool()
        .wait_for_connections(2, Duration::from_secs(1))
        .await
        .unwrap();

    let outcome = session
        .run_with_grace(tokio::time::sleep(Duration::from_millis(500)))
        .await;
    assert_eq!(outcome, RunOutcome::Cancelled);
    session.shutdown().await;

    for mut peer in connector.take_peers() {
        let mut buf = Vec::new();
        peer.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
    assert!(notifier.events.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_release_reaches_a_socket_before_any_claim() {
    let connector = RecordingConnector::new();

    let session = Session::start(
        plan(),
        pool_options(4),
        TransferOptions::new(),
        connector.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .unwrap();

    let outcome = session.run_with_grace(std::future::pending()).await;
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    session.shutdown().await;

    let release_line = format!("PATCH /api/v8/guilds/{SOURCE_GUILD}/vanity-url ");
    let claim_line = format!("PATCH /api/v8/guilds/{TARGET_GUILD}/vanity-url ");

    let writes = connector.writes();
    let releases: Vec<usize> = writes
        .iter()
        .enumerate()
        .filter(|(_, w)| w.bytes.starts_with(release_line.as_bytes()))
        .map(|(at, _)| at)
        .collect();
    let claims: Vec<usize> = writes
        .iter()
        .enumerate()
        .filter(|(_, w)| w.bytes.starts_with(claim_line.as_bytes()))
        .map(|(at, _)| at)
        .collect();

    assert_eq!(releases.len(), 2);
    assert_eq!(claims.len(), 24);
    assert!(releases.iter().max() < claims.iter().min());

    // Both releases went out on different connections.
    assert_ne!(writes[releases[0]].connection, writes[releases[1]].connection);
}
