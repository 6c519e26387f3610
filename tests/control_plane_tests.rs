//! Process wiring: background tasks come up against the configured fleet.

use std::sync::Arc;
use std::time::Duration;

use hostplane::adapter::store::MemoryStore;
use hostplane::app::{Config, ControlPlane};
use hostplane::domain::{ContainerStatus, NodeId, ServerId, ServerStatus};
use hostplane::testkit::connector::StubConnector;
use hostplane::testkit::containers::ScriptedContainers;
use hostplane::testkit::domain::{owner, placed};
use hostplane::testkit::probe::ScriptedCheck;

struct Fleet {
    store: Arc<MemoryStore>,
    runner: Arc<ScriptedContainers>,
    connector: Arc<StubConnector>,
}

fn fleet() -> Fleet {
    let store = Arc::new(MemoryStore::new());
    store.link(NodeId::new("a"), NodeId::new("s1"));
    store.insert_owner(owner("u1", 4096));
    let runner = Arc::new(ScriptedContainers::new());
    let connector = Arc::new(StubConnector::new().with_runner("a", runner.clone()));
    Fleet {
        store,
        runner,
        connector,
    }
}

#[tokio::test]
async fn start_subscribes_to_every_runner_node() {
    let fleet = fleet();
    let config = Config::default();

    let plane = ControlPlane::start(
        &config,
        fleet.store.clone(),
        fleet.connector.clone(),
        Arc::new(ScriptedCheck::new()),
    )
    .await
    .unwrap();
    tokio::time::timeout(Duration::from_secs(5), fleet.runner.wait_for_streams(1))
        .await
        .expect("status stream opened");

    assert!(plane.idle_watcher().is_some());
    assert_eq!(fleet.connector.opened(), vec!["runner-node-a".to_string()]);
    plane.shutdown();
}

#[tokio::test]
async fn disabled_idle_shutdown_has_no_watcher() {
    let fleet = fleet();
    let mut config = Config::default();
    config.idle.enabled = false;

    let plane = ControlPlane::start(
        &config,
        fleet.store.clone(),
        fleet.connector.clone(),
        Arc::new(ScriptedCheck::new()),
    )
    .await
    .unwrap();

    assert!(plane.idle_watcher().is_none());
    plane.shutdown();
}

#[tokio::test]
async fn relay_events_flow_into_persisted_status() {
    let fleet = fleet();
    let id = ServerId::new(1);
    fleet
        .store
        .insert_server(placed(1, "u1", 1024, ServerStatus::Offline, "a"));

    let plane = ControlPlane::start(
        &Config::default(),
        fleet.store.clone(),
        fleet.connector.clone(),
        Arc::new(ScriptedCheck::new()),
    )
    .await
    .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while fleet.runner.running_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reconciled after connect");

    fleet.runner.push_change(1, ContainerStatus::Starting);
    tokio::time::timeout(Duration::from_secs(5), async {
        while fleet.store.get(id).map(|s| s.status) != Some(ServerStatus::Starting) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status applied");

    assert!(plane.controller().probe().is_empty());
    plane.shutdown();
}
