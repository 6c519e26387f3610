//! A lifecycle controller wired to scripted runner nodes, in-memory storage
//! and an on-demand readiness check.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use hostplane::adapter::store::MemoryStore;
use hostplane::domain::{Actor, NodeId, Server, ServerEvent, ServerId, ServerStatus};
use hostplane::runtime::{EventBus, LifecycleController, ReadinessProbe, RpcConnectionManager};
use hostplane::testkit::config;
use hostplane::testkit::connector::StubConnector;
use hostplane::testkit::containers::ScriptedContainers;
use hostplane::testkit::domain::{owner, STORAGE_NODE};
use hostplane::testkit::probe::ScriptedCheck;
use hostplane::testkit::storage::{memory_storage, MemoryExtensions, MemoryFiles};

pub const OWNER: &str = "u1";
pub const OWNER_LIMIT_MB: u64 = 4096;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub runners: BTreeMap<String, Arc<ScriptedContainers>>,
    pub connector: Arc<StubConnector>,
    pub files: Arc<MemoryFiles>,
    pub extensions: Arc<MemoryExtensions>,
    pub checker: Arc<ScriptedCheck>,
    pub probe: ReadinessProbe,
    pub events: EventBus,
    pub controller: LifecycleController,
    rx: broadcast::Receiver<ServerEvent>,
}

impl Harness {
    /// Runner nodes linked to the shared storage node, plus one owner.
    pub fn new(runners: Vec<(&str, ScriptedContainers)>) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_owner(owner(OWNER, OWNER_LIMIT_MB));

        let (files, extensions, channel) = memory_storage();
        let mut connector = StubConnector::new().with_storage(STORAGE_NODE, channel);
        let mut scripted = BTreeMap::new();
        for (name, containers) in runners {
            store.link(NodeId::new(name), NodeId::new(STORAGE_NODE));
            let containers = Arc::new(containers);
            connector = connector.with_runner(name, containers.clone());
            scripted.insert(name.to_string(), containers);
        }
        let connector = Arc::new(connector);

        let checker = Arc::new(ScriptedCheck::new());
        let probe = ReadinessProbe::new(checker.clone(), Duration::from_millis(10));
        let events = EventBus::new(256);
        let rx = events.subscribe();
        let controller = LifecycleController::new(
            store.clone(),
            Arc::new(RpcConnectionManager::new(connector.clone())),
            probe.clone(),
            events.clone(),
            config::lifecycle(),
        );

        Self {
            store,
            runners: scripted,
            connector,
            files,
            extensions,
            checker,
            probe,
            events,
            controller,
            rx,
        }
    }

    /// One runner node `a` with default answers.
    pub fn single() -> Self {
        Self::new(vec![("a", ScriptedContainers::new())])
    }

    pub fn runner(&self, name: &str) -> &Arc<ScriptedContainers> {
        &self.runners[name]
    }

    pub fn insert(&self, server: Server) -> ServerId {
        let id = server.id;
        self.store.insert_server(server);
        id
    }

    pub fn status(&self, id: ServerId) -> ServerStatus {
        self.store.get(id).map(|s| s.status).expect("server exists")
    }

    pub fn server(&self, id: ServerId) -> Server {
        self.store.get(id).expect("server exists")
    }

    /// Next `StatusChanged` event as `(previous, status, producer)`.
    pub async fn next_change(&mut self) -> (ServerStatus, ServerStatus, Actor) {
        loop {
            let event = timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("status change within 5s")
                .expect("event bus open");
            if let ServerEvent::StatusChanged {
                previous,
                status,
                producer,
                ..
            } = event
            {
                return (previous, status, producer);
            }
        }
    }

    /// Every event published so far and not yet consumed.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Status changes among the drained events.
    pub fn drain_changes(&mut self) -> Vec<(ServerStatus, ServerStatus)> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::StatusChanged {
                    previous, status, ..
                } => Some((previous, status)),
                _ => None,
            })
            .collect()
    }

    /// Wait until the persisted status of `id` is `status`.
    pub async fn wait_for_status(&self, id: ServerId, status: ServerStatus) {
        let reached = timeout(Duration::from_secs(5), async {
            while self.status(id) != status {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            reached.is_ok(),
            "server {id} stuck in {} waiting for {status}",
            self.status(id)
        );
    }
}

pub fn user(id: &str) -> Actor {
    Actor::User(id.into())
}
