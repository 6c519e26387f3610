//! Node scheduler: placement, caching and failure handling.

mod support;

use hostplane::domain::{NodeId, ServerStatus};
use hostplane::error::Error;
use hostplane::testkit::containers::ScriptedContainers;
use hostplane::testkit::domain::{node_stats, placed, server};
use support::harness::{Harness, OWNER};

fn two_nodes(a_free_mb: u64, b_free_mb: u64) -> Harness {
    Harness::new(vec![
        ("a", ScriptedContainers::new().with_stats(node_stats(a_free_mb))),
        ("b", ScriptedContainers::new().with_stats(node_stats(b_free_mb))),
    ])
}

#[tokio::test]
async fn picks_node_with_least_free_memory() {
    let h = two_nodes(400, 900);
    let id = h.insert(server(1, OWNER, 1024));

    let node = h.controller.scheduler().resolve_runner_node(id, false).await.unwrap();

    assert_eq!(node, NodeId::new("a"));
    assert_eq!(h.server(id).runner_node_id, Some(NodeId::new("a")));
}

#[tokio::test]
async fn unreachable_nodes_are_excluded() {
    let h = Harness::new(vec![
        ("a", ScriptedContainers::unreachable()),
        ("b", ScriptedContainers::new().with_stats(node_stats(900))),
    ]);
    let id = h.insert(server(1, OWNER, 1024));

    let node = h.controller.scheduler().resolve_runner_node(id, false).await.unwrap();

    assert_eq!(node, NodeId::new("b"));
}

#[tokio::test]
async fn no_reachable_node_is_an_error() {
    let h = Harness::new(vec![
        ("a", ScriptedContainers::unreachable()),
        ("b", ScriptedContainers::unreachable()),
    ]);
    let id = h.insert(server(1, OWNER, 1024));

    let err = h
        .controller
        .scheduler()
        .resolve_runner_node(id, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoNodeAvailable { storage_node } if storage_node == NodeId::new("s1")));
    assert_eq!(h.server(id).runner_node_id, None);
}

#[tokio::test]
async fn storage_node_without_linked_runners_is_an_error() {
    let h = Harness::single();
    let mut orphan = server(1, OWNER, 1024);
    orphan.storage_node_id = NodeId::new("s9");
    let id = h.insert(orphan);

    let err = h
        .controller
        .scheduler()
        .resolve_runner_node(id, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoNodeAvailable { storage_node } if storage_node == NodeId::new("s9")));
    assert_eq!(h.runner("a").stats_count(), 0);
}

#[tokio::test]
async fn persisted_placement_is_used_without_querying_nodes() {
    let h = two_nodes(400, 900);
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Offline, "b"));

    let node = h.controller.scheduler().resolve_runner_node(id, false).await.unwrap();

    assert_eq!(node, NodeId::new("b"));
    assert_eq!(h.runner("a").stats_count() + h.runner("b").stats_count(), 0);
}

#[tokio::test]
async fn resolution_is_cached() {
    let h = two_nodes(400, 900);
    let id = h.insert(server(1, OWNER, 1024));
    let scheduler = h.controller.scheduler();

    scheduler.resolve_runner_node(id, false).await.unwrap();
    scheduler.resolve_runner_node(id, false).await.unwrap();

    assert_eq!(h.runner("a").stats_count(), 1);
    let cached = scheduler.cached(id);
    assert_eq!(cached.runner, Some(NodeId::new("a")));
    assert_eq!(cached.storage, Some(NodeId::new("s1")));
}

#[tokio::test]
async fn force_new_reselects_and_persists() {
    let h = two_nodes(900, 400);
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Offline, "a"));

    let node = h.controller.scheduler().resolve_runner_node(id, true).await.unwrap();

    assert_eq!(node, NodeId::new("b"));
    assert_eq!(h.server(id).runner_node_id, Some(NodeId::new("b")));
    assert_eq!(h.runner("a").stats_count(), 1);
}

#[tokio::test]
async fn storage_node_comes_from_the_server_record() {
    let h = Harness::single();
    let id = h.insert(server(1, OWNER, 1024));

    let node = h.controller.scheduler().resolve_storage_node(id).await.unwrap();

    assert_eq!(node, NodeId::new("s1"));
    assert_eq!(h.controller.scheduler().cached(id).runner, None);
}

#[tokio::test]
async fn pinning_overrides_placement() {
    let h = two_nodes(400, 900);
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Online, "a"));

    h.controller
        .scheduler()
        .pin_runner_node(id, &NodeId::new("b"))
        .await
        .unwrap();

    assert_eq!(h.server(id).runner_node_id, Some(NodeId::new("b")));
    assert_eq!(
        h.controller.scheduler().cached(id).runner,
        Some(NodeId::new("b"))
    );
}
