//! Status subscriptions and reconciliation after connectivity loss.

mod support;

use std::time::Duration;

use hostplane::domain::{ContainerStatus, NodeId, ServerId, ServerStatus};
use hostplane::error::RpcError;
use hostplane::runtime::ReconcileReport;
use hostplane::testkit::containers::ScriptedContainers;
use hostplane::testkit::domain::{placed, server};
use support::harness::{Harness, OWNER};

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

fn forced(changes: &[(ServerStatus, ServerStatus)], to: ServerStatus) -> usize {
    changes.iter().filter(|(_, status)| *status == to).count()
}

// ---- Reconcile pass ----

#[tokio::test]
async fn reconcile_aligns_persisted_status_with_running_containers() {
    let h = Harness::new(vec![
        ("a", ScriptedContainers::new()),
        ("b", ScriptedContainers::new()),
    ]);
    let gone = h.insert(placed(1, OWNER, 512, ServerStatus::Online, "a"));
    let booting = h.insert(placed(2, OWNER, 512, ServerStatus::Starting, "a"));
    let stale = h.insert(placed(3, OWNER, 512, ServerStatus::Offline, "a"));
    let elsewhere = h.insert(placed(4, OWNER, 512, ServerStatus::Online, "b"));
    let healthy = h.insert(placed(5, OWNER, 512, ServerStatus::Online, "a"));
    h.runner("a")
        .set_running(vec![booting, stale, healthy, ServerId::new(99)]);

    let report = h.controller.reconcile_node(&NodeId::new("a")).await.unwrap();

    assert_eq!(
        report,
        ReconcileReport {
            forced_offline: 1,
            forced_online: 2,
        }
    );
    assert_eq!(h.status(gone), ServerStatus::Offline);
    assert_eq!(h.status(booting), ServerStatus::Online);
    assert_eq!(h.status(stale), ServerStatus::Online);
    assert_eq!(h.status(elsewhere), ServerStatus::Online);
    assert_eq!(h.status(healthy), ServerStatus::Online);
}

#[tokio::test]
async fn offline_server_found_running_passes_through_starting() {
    let mut h = Harness::single();
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Offline, "a"));
    h.runner("a").set_running(vec![id]);

    h.controller.reconcile_node(&NodeId::new("a")).await.unwrap();

    assert_eq!(
        h.drain_changes(),
        vec![
            (ServerStatus::Offline, ServerStatus::Starting),
            (ServerStatus::Starting, ServerStatus::Online),
        ]
    );
}

#[tokio::test]
async fn running_container_pins_server_to_reporting_node() {
    let h = Harness::new(vec![
        ("a", ScriptedContainers::new()),
        ("b", ScriptedContainers::new()),
    ]);
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Online, "b"));
    h.runner("a").set_running(vec![id]);

    h.controller.reconcile_node(&NodeId::new("a")).await.unwrap();

    assert_eq!(h.server(id).runner_node_id, Some(NodeId::new("a")));
    assert_eq!(h.status(id), ServerStatus::Online);
}

#[tokio::test]
async fn reconcile_clears_pending_readiness_checks() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Starting, "a"));
    h.controller
        .handle_status_event(
            &NodeId::new("a"),
            hostplane::domain::StatusEvent::change(id, ContainerStatus::Started),
        )
        .await;
    assert!(h.probe.is_pending(id));

    h.controller.reconcile_node(&NodeId::new("a")).await.unwrap();

    assert!(!h.probe.is_pending(id));
    assert_eq!(h.status(id), ServerStatus::Offline);
}

#[tokio::test]
async fn archived_server_is_never_forced_online() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Archived, "a"));
    h.runner("a").set_running(vec![id]);

    let report = h.controller.reconcile_node(&NodeId::new("a")).await.unwrap();

    assert_eq!(report, ReconcileReport::default());
    assert_eq!(h.status(id), ServerStatus::Archived);
}

#[tokio::test]
async fn reconcile_fails_when_running_list_is_unavailable() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Online, "a"));
    h.runner("a").fail_running(RpcError::Transport("reset".into()));

    assert!(h.controller.reconcile_node(&NodeId::new("a")).await.is_err());
    assert_eq!(h.status(id), ServerStatus::Online);
}

// ---- Subscription ----

#[tokio::test]
async fn subscription_reconciles_once_after_failed_connects() {
    let mut h = Harness::new(vec![(
        "a",
        ScriptedContainers::new().with_stream_failures(2),
    )]);
    let gone = h.insert(placed(1, OWNER, 512, ServerStatus::Online, "a"));
    let booting = h.insert(placed(2, OWNER, 512, ServerStatus::Starting, "a"));
    h.runner("a").set_running(vec![booting]);

    let task = h.controller.subscribe_node(NodeId::new("a"));
    h.runner("a").wait_for_streams(3).await;
    h.wait_for_status(gone, ServerStatus::Offline).await;
    h.wait_for_status(booting, ServerStatus::Online).await;

    assert_eq!(h.runner("a").running_count(), 1);
    let changes = h.drain_changes();
    assert_eq!(forced(&changes, ServerStatus::Offline), 1);
    assert_eq!(forced(&changes, ServerStatus::Online), 1);
    task.abort();
}

#[tokio::test]
async fn subscription_applies_events_after_reconcile() {
    let h = Harness::single();
    let id = h.insert(server(1, OWNER, 512));
    let task = h.controller.subscribe_node(NodeId::new("a"));
    h.runner("a").wait_for_streams(1).await;
    let runner = h.runner("a").clone();
    eventually("reconcile", || runner.running_count() == 1).await;

    assert!(h.runner("a").push_change(1, ContainerStatus::Starting));
    h.wait_for_status(id, ServerStatus::Starting).await;

    task.abort();
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let h = Harness::single();
    let id = h.insert(server(1, OWNER, 512));
    let task = h.controller.subscribe_node(NodeId::new("a"));
    h.runner("a").wait_for_streams(1).await;
    let runner = h.runner("a").clone();
    eventually("reconcile", || runner.running_count() == 1).await;

    h.runner("a").push_error(RpcError::Decode {
        what: "status event",
        reason: "unknown variant".into(),
    });
    h.runner("a").push_change(1, ContainerStatus::Starting);
    h.wait_for_status(id, ServerStatus::Starting).await;

    assert_eq!(h.runner("a").stream_count(), 1);
    task.abort();
}

#[tokio::test]
async fn lost_stream_reconnects_and_reconciles_again() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Online, "a"));
    h.runner("a").set_running(vec![id]);
    let task = h.controller.subscribe_node(NodeId::new("a"));
    h.runner("a").wait_for_streams(1).await;
    let runner = h.runner("a").clone();
    eventually("first reconcile", || runner.running_count() == 1).await;

    // The container dies while the node is unreachable.
    h.runner("a").set_running(Vec::new());
    h.runner("a").end_stream();
    h.runner("a").wait_for_streams(2).await;

    h.wait_for_status(id, ServerStatus::Offline).await;
    assert_eq!(h.runner("a").running_count(), 2);
    task.abort();
}

#[tokio::test]
async fn failed_reconcile_is_retried_on_next_connect() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 512, ServerStatus::Online, "a"));
    h.runner("a").fail_running(RpcError::Transport("reset".into()));
    let task = h.controller.subscribe_node(NodeId::new("a"));
    h.runner("a").wait_for_streams(1).await;
    let runner = h.runner("a").clone();
    eventually("failed reconcile", || runner.running_count() == 1).await;
    assert_eq!(h.status(id), ServerStatus::Online);

    h.runner("a").set_running(Vec::new());
    h.runner("a").end_stream();

    h.wait_for_status(id, ServerStatus::Offline).await;
    task.abort();
}

#[tokio::test]
async fn subscribe_all_covers_every_runner_node() {
    let h = Harness::new(vec![
        ("a", ScriptedContainers::new()),
        ("b", ScriptedContainers::new()),
    ]);

    let tasks = h.controller.subscribe_all().await.unwrap();
    h.runner("a").wait_for_streams(1).await;
    h.runner("b").wait_for_streams(1).await;

    assert_eq!(tasks.len(), 2);
    for task in tasks {
        task.abort();
    }
}
