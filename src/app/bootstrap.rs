//! Process wiring.
//!
//! Builds the store, node connector, readiness probe, lifecycle controller
//! and background tasks from a [`Config`], and keeps the task handles.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::notifier::LogNotifier;
use crate::adapter::rpc::HttpConnector;
use crate::adapter::store::MemoryStore;
use crate::app::config::Config;
use crate::error::Result;
use crate::port::{Connector, NotifierRegistry, ServerStore};
use crate::runtime::{
    ArchiveSweeper, EventBus, IdleShutdownWatcher, LifecycleController, PingClient,
    ReadinessProbe, RpcConnectionManager, StatusCheck,
};

/// Notifiers receiving every published event.
#[must_use]
pub fn build_notifier_registry(_config: &Config) -> NotifierRegistry {
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(LogNotifier));
    registry
}

/// A running control plane and its background tasks.
pub struct ControlPlane {
    controller: LifecycleController,
    idle: Option<Arc<IdleShutdownWatcher>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlPlane {
    /// Wire everything and spawn the background tasks: notifier dispatch,
    /// readiness probe loop, idle watcher, archive sweeper (when enabled)
    /// and one status subscription per runner node.
    pub async fn start(
        config: &Config,
        store: Arc<dyn ServerStore>,
        connector: Arc<dyn Connector>,
        checker: Arc<dyn StatusCheck>,
    ) -> Result<Self> {
        let events = EventBus::new(config.lifecycle.event_capacity);
        let connections = Arc::new(RpcConnectionManager::new(connector));
        let probe = ReadinessProbe::new(checker, config.probe.tick());
        let controller = LifecycleController::new(
            store,
            connections,
            probe.clone(),
            events.clone(),
            config.lifecycle.clone(),
        );

        let mut tasks = Vec::new();

        let notifiers = build_notifier_registry(config);
        info!(notifiers = ?notifiers.names(), "Notifiers initialized");
        tasks.push(events.spawn_notifier_dispatch(notifiers));

        tasks.push(tokio::spawn(probe.run()));

        let idle = if config.idle.enabled {
            let watcher = Arc::new(IdleShutdownWatcher::new(
                Arc::new(controller.clone()),
                config.idle.grace(),
                config.idle.tick(),
            ));
            tasks.push(tokio::spawn(watcher.clone().run(events.subscribe())));
            Some(watcher)
        } else {
            warn!("Idle shutdown disabled");
            None
        };

        if config.archive.sweep_enabled {
            let sweeper = ArchiveSweeper::new(controller.clone(), &config.archive);
            tasks.push(tokio::spawn(sweeper.run()));
            info!(
                interval_secs = config.archive.interval_secs,
                batch_size = config.archive.batch_size,
                "Archive sweeper enabled"
            );
        }

        let subscriptions = controller.subscribe_all().await?;
        info!(runner_nodes = subscriptions.len(), "Status subscriptions started");
        tasks.extend(subscriptions);

        Ok(Self {
            controller,
            idle,
            tasks,
        })
    }

    #[must_use]
    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    #[must_use]
    pub fn idle_watcher(&self) -> Option<&Arc<IdleShutdownWatcher>> {
        self.idle.as_ref()
    }

    /// Wait for the background tasks. They only end on panic or abort.
    pub async fn join(self) {
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!(error = %e, "Background task panicked");
                }
            }
        }
    }

    /// Abort every background task.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(tasks = self.tasks.len(), "Control plane stopped");
    }
}

/// Standalone control plane: in-memory store seeded from the inventory,
/// HTTP/WebSocket node connector, TCP readiness checks.
pub struct App;

impl App {
    /// Run until every background task ends.
    pub async fn run(config: Config) -> Result<()> {
        let store = Arc::new(MemoryStore::from_inventory(&config.inventory));
        info!(
            servers = store.len(),
            runner_nodes = config.inventory.runners.len(),
            storage_nodes = config.inventory.storage_nodes().len(),
            "Inventory loaded"
        );
        let connector = Arc::new(HttpConnector::new(config.rpc.clone())?);
        let checker = Arc::new(PingClient::new(&config.probe));

        let plane = ControlPlane::start(&config, store, connector, checker).await?;
        plane.join().await;
        Ok(())
    }
}
