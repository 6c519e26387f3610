//! Idle shutdown watcher driven by the lifecycle controller's events.

mod support;

use std::sync::Arc;
use std::time::Duration;

use hostplane::domain::{ContainerStatus, NodeId, PlayerCountUpdate, ServerStatus, StatusEvent};
use hostplane::runtime::IdleShutdownWatcher;
use hostplane::testkit::domain::placed;
use support::harness::{Harness, OWNER};

const GRACE: Duration = Duration::from_secs(300);
const TICK: Duration = Duration::from_secs(10);

fn watch(h: &Harness) -> (Arc<IdleShutdownWatcher>, tokio::task::JoinHandle<()>) {
    let watcher = Arc::new(IdleShutdownWatcher::new(
        Arc::new(h.controller.clone()),
        GRACE,
        TICK,
    ));
    let task = tokio::spawn(watcher.clone().run(h.events.subscribe()));
    (watcher, task)
}

#[tokio::test(start_paused = true)]
async fn empty_online_server_is_stopped_after_grace() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Online, "a"));
    let (watcher, task) = watch(&h);

    h.controller
        .set_player_count(id, PlayerCountUpdate::Set(0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(watcher.is_armed(id));

    tokio::time::sleep(Duration::from_secs(250)).await;
    assert_eq!(h.runner("a").stop_count(), 0);

    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(h.runner("a").stops(), vec![id]);
    assert!(!watcher.is_armed(id));
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn joining_player_cancels_shutdown() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Online, "a"));
    let (watcher, task) = watch(&h);

    h.controller
        .set_player_count(id, PlayerCountUpdate::Set(0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(100)).await;
    h.controller
        .set_player_count(id, PlayerCountUpdate::Add(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert!(!watcher.is_armed(id));
    assert_eq!(h.runner("a").stop_count(), 0);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn server_coming_online_is_armed() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Starting, "a"));
    let (watcher, task) = watch(&h);

    h.controller
        .handle_status_event(
            &NodeId::new("a"),
            StatusEvent::change(id, ContainerStatus::Started),
        )
        .await;
    h.checker.set_ready(true);
    h.probe.tick().await;
    assert_eq!(h.status(id), ServerStatus::Online);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(watcher.is_armed(id));

    tokio::time::sleep(GRACE + TICK).await;
    assert_eq!(h.runner("a").stop_count(), 1);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn leaving_online_disarms() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Online, "a"));
    let (watcher, task) = watch(&h);

    h.controller
        .set_player_count(id, PlayerCountUpdate::Set(0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller
        .handle_status_event(
            &NodeId::new("a"),
            StatusEvent::change(id, ContainerStatus::Exited),
        )
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!watcher.is_armed(id));
    tokio::time::sleep(GRACE + TICK).await;
    assert_eq!(h.runner("a").stop_count(), 0);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn failed_idle_stop_is_not_counted() {
    let h = Harness::single();
    let id = h.insert(placed(1, OWNER, 1024, ServerStatus::Offline, "a"));
    let watcher = IdleShutdownWatcher::new(Arc::new(h.controller.clone()), GRACE, TICK);

    // A stale report for a server that is no longer online.
    watcher.observe(&hostplane::domain::ServerEvent::PlayerCountUpdated {
        server_id: id,
        player_count: 0,
        status: ServerStatus::Online,
    });
    tokio::time::advance(GRACE).await;

    assert_eq!(watcher.sweep().await, 0);
    assert_eq!(h.runner("a").stop_count(), 0);
    assert!(!watcher.is_armed(id));
}
