//! Server lifecycle controller.
//!
//! The only writer of a server's status and runner node. It admits and
//! issues starts and stops, turns relay status events into persisted status
//! changes, arms the readiness probe, and replays restart intent once a
//! server reaches OFFLINE.
//!
//! Status changes for one server are serialized through a per-server lock;
//! different servers proceed independently.

mod archive;
mod subscription;

pub use archive::{ArchiveInformation, ArchiveSweeper, ARCHIVE_INFO_FILE};
pub use subscription::ReconcileReport;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::connection::RpcConnectionManager;
use super::events::EventBus;
use super::idle::IdleStopper;
use super::probe::{PendingCheck, ReadinessProbe};
use super::scheduler::NodeScheduler;
use crate::app::config::LifecycleConfig;
use crate::domain::{
    container_name, working_memory_bytes, Actor, ContainerStatus, NodeId, Owner, PlayerCountUpdate,
    Server, ServerEvent, ServerId, ServerStatus, StatusEvent, StatusPayload, UserId,
};
use crate::error::{Error, Result};
use crate::port::{
    ConsoleSession, ContainerService, ServerStore, StartContainerRequest, StartOutcome,
    TerminalSize, ENV_OWNER_ID, ENV_OWNER_NAME, ENV_SERVER_ID,
};

struct Inner {
    store: Arc<dyn ServerStore>,
    connections: Arc<RpcConnectionManager>,
    scheduler: NodeScheduler,
    probe: ReadinessProbe,
    events: EventBus,
    config: LifecycleConfig,
    /// Last user who acted on a server, for event attribution.
    last_actor: Mutex<HashMap<ServerId, UserId>>,
    /// Servers to start again once they reach OFFLINE.
    restarts: Mutex<HashMap<ServerId, Actor>>,
    locks: DashMap<ServerId, Arc<AsyncMutex<()>>>,
    /// Serializes admission across one owner's servers.
    owner_locks: DashMap<UserId, Arc<AsyncMutex<()>>>,
}

/// Authority for server status. Cheap to clone.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

impl LifecycleController {
    #[must_use]
    pub fn new(
        store: Arc<dyn ServerStore>,
        connections: Arc<RpcConnectionManager>,
        probe: ReadinessProbe,
        events: EventBus,
        config: LifecycleConfig,
    ) -> Self {
        let scheduler = NodeScheduler::new(store.clone(), connections.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                connections,
                scheduler,
                probe,
                events,
                config,
                last_actor: Mutex::new(HashMap::new()),
                restarts: Mutex::new(HashMap::new()),
                locks: DashMap::new(),
                owner_locks: DashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &NodeScheduler {
        &self.inner.scheduler
    }

    #[must_use]
    pub fn probe(&self) -> &ReadinessProbe {
        &self.inner.probe
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ServerStore> {
        &self.inner.store
    }

    /// Whether a restart is pending for the server.
    #[must_use]
    pub fn restart_pending(&self, server_id: ServerId) -> bool {
        self.inner.restarts.lock().contains_key(&server_id)
    }

    fn lock_for(&self, server_id: ServerId) -> Arc<AsyncMutex<()>> {
        self.inner
            .locks
            .entry(server_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn owner_lock_for(&self, owner: &UserId) -> Arc<AsyncMutex<()>> {
        self.inner
            .owner_locks
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn containers(&self, node: &NodeId) -> Arc<dyn ContainerService> {
        self.inner.connections.containers(node)
    }

    // ---- Start / stop ----

    /// Start an OFFLINE server.
    ///
    /// Admission is checked against the owner's ram limit before any node is
    /// contacted. `start_command` replaces the version's template. An
    /// accepted start leaves the server STARTING before this returns.
    ///
    /// # Errors
    ///
    /// [`Error::WrongState`] unless OFFLINE, [`Error::OwnerRamLimit`],
    /// [`Error::NoNodeAvailable`], [`Error::SystemAtCapacity`] when the relay
    /// reports the host full, [`Error::Internal`] on RPC failure.
    pub async fn start(
        &self,
        server_id: ServerId,
        actor: Actor,
        start_command: Option<String>,
    ) -> Result<()> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        let server = self.inner.store.server(server_id).await?;
        if server.status != ServerStatus::Offline {
            return Err(Error::WrongState {
                server_id,
                expected: ServerStatus::Offline,
                actual: server.status,
            });
        }
        let owner_lock = self.owner_lock_for(&server.owner_id);
        let _owner_guard = owner_lock.lock().await;
        let owner = self.admit(&server).await?;

        if let Some(user) = actor.user() {
            self.inner.last_actor.lock().insert(server_id, user.clone());
        }

        let request = self.start_request(&server, &owner, start_command);
        let result = self.issue_start(server_id, &request).await;
        if result.is_err() {
            self.inner.last_actor.lock().remove(&server_id);
        }

        match result? {
            StartOutcome::Accepted => {
                info!(server_id = %server_id, actor = %actor, ram_mb = server.ram_mb, "Start accepted");
                self.set_status_locked(server_id, ServerStatus::Starting).await?;
                Ok(())
            }
            StartOutcome::Full => {
                warn!(server_id = %server_id, "Runner node is full");
                Err(Error::SystemAtCapacity)
            }
        }
    }

    async fn admit(&self, server: &Server) -> Result<Owner> {
        let owner = self.inner.store.owner(&server.owner_id).await?;
        let in_use_mb: u64 = self
            .inner
            .store
            .owner_servers_with_status(&server.owner_id, &ServerStatus::RAM_CONSUMING)
            .await?
            .iter()
            .map(|s| s.ram_mb)
            .sum();

        if in_use_mb + server.ram_mb > owner.ram_limit_mb {
            return Err(Error::OwnerRamLimit {
                owner: owner.id,
                in_use_mb,
                requested_mb: server.ram_mb,
                limit_mb: owner.ram_limit_mb,
            });
        }
        Ok(owner)
    }

    fn start_request(
        &self,
        server: &Server,
        owner: &Owner,
        start_command: Option<String>,
    ) -> StartContainerRequest {
        let template = start_command.unwrap_or_else(|| server.version.start_command.clone());
        let env = BTreeMap::from([
            (ENV_OWNER_ID.to_string(), owner.id.to_string()),
            (ENV_OWNER_NAME.to_string(), owner.display_name.clone()),
            (ENV_SERVER_ID.to_string(), server.id.to_string()),
        ]);
        StartContainerRequest {
            server_id: server.id,
            storage_node: server.storage_node_id.clone(),
            image: server.version.image.clone(),
            ram_bytes: working_memory_bytes(server.ram_mb, self.inner.config.memory_buffer_cap_mb),
            start_command: crate::domain::render_start_command(&template, server.ram_mb),
            env,
        }
    }

    /// Start on the resolved node; on a transport failure, place the server
    /// anew once and retry there.
    async fn issue_start(
        &self,
        server_id: ServerId,
        request: &StartContainerRequest,
    ) -> Result<StartOutcome> {
        let node = self.inner.scheduler.resolve_runner_node(server_id, false).await?;
        match self.containers(&node).start_container(request).await {
            Err(e) if e.is_transport() => {
                warn!(server_id = %server_id, node = %node, error = %e, "Runner node unreachable, reassigning");
                let node = self.inner.scheduler.resolve_runner_node(server_id, true).await?;
                Ok(self.containers(&node).start_container(request).await?)
            }
            other => Ok(other?),
        }
    }

    /// Stop an ONLINE server. With `restart`, it is started again by the
    /// same actor once it reaches OFFLINE.
    ///
    /// # Errors
    ///
    /// [`Error::WrongState`] unless ONLINE, [`Error::Internal`] on RPC failure.
    pub async fn stop(&self, server_id: ServerId, actor: Actor, restart: bool) -> Result<()> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        let server = self.inner.store.server(server_id).await?;
        if server.status != ServerStatus::Online {
            return Err(Error::WrongState {
                server_id,
                expected: ServerStatus::Online,
                actual: server.status,
            });
        }

        if let Some(user) = actor.user() {
            self.inner.last_actor.lock().insert(server_id, user.clone());
        }
        if restart {
            self.inner.restarts.lock().insert(server_id, actor.clone());
        }

        let node = self.inner.scheduler.resolve_runner_node(server_id, false).await?;
        if let Err(e) = self.containers(&node).stop_container(server_id).await {
            self.inner.restarts.lock().remove(&server_id);
            error!(server_id = %server_id, node = %node, error = %e, "Stop failed");
            return Err(e.into());
        }

        info!(server_id = %server_id, actor = %actor, restart, "Stop requested");
        Ok(())
    }

    // ---- Console ----

    /// Write a command line to the server console.
    pub async fn run_command(&self, server_id: ServerId, command: &str) -> Result<()> {
        let node = self.inner.scheduler.resolve_runner_node(server_id, false).await?;
        self.containers(&node).exec_command(server_id, command).await?;
        Ok(())
    }

    /// Attach to the server console.
    pub async fn attach_console(
        &self,
        server_id: ServerId,
        size: TerminalSize,
    ) -> Result<ConsoleSession> {
        let node = self.inner.scheduler.resolve_runner_node(server_id, false).await?;
        Ok(self.containers(&node).attach_console(server_id, size).await?)
    }

    // ---- Player count ----

    /// Apply a player count report and publish the new count.
    pub async fn set_player_count(
        &self,
        server_id: ServerId,
        update: PlayerCountUpdate,
    ) -> Result<u32> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        let mut server = self.inner.store.server(server_id).await?;
        server.player_count = update.apply(server.player_count);
        self.inner.store.save_server(&server).await?;

        self.inner.events.publish(ServerEvent::PlayerCountUpdated {
            server_id,
            player_count: server.player_count,
            status: server.status,
        });
        Ok(server.player_count)
    }

    // ---- Status events ----

    /// Apply one event from `node`'s status stream.
    pub async fn handle_status_event(&self, node: &NodeId, event: StatusEvent) {
        let server_id = event.server_id;
        let status = match event.payload {
            StatusPayload::Stats(stats) => {
                self.inner
                    .events
                    .publish(ServerEvent::StatsSampled { server_id, stats });
                return;
            }
            StatusPayload::Change(status) => status,
        };

        let next = match status {
            ContainerStatus::Stopped | ContainerStatus::Exited | ContainerStatus::CouldNotStart => {
                self.inner.probe.remove(server_id);
                ServerStatus::Offline
            }
            ContainerStatus::Stopping => {
                self.inner.probe.remove(server_id);
                ServerStatus::Stopping
            }
            ContainerStatus::Starting => ServerStatus::Starting,
            ContainerStatus::CouldNotStop => ServerStatus::Online,
            ContainerStatus::Started => {
                self.watch_readiness(server_id, node.clone());
                return;
            }
        };

        if let Err(e) = self.set_status(server_id, next).await {
            error!(server_id = %server_id, node = %node, status = %next, error = %e, "Status update failed");
        }
    }

    fn watch_readiness(&self, server_id: ServerId, node: NodeId) {
        let ready = self.clone();
        let unready = self.clone();
        let check = PendingCheck {
            server_id,
            host: container_name(&self.inner.config.container_prefix, server_id),
            port: self.inner.config.game_port,
            deadline: Instant::now() + self.inner.config.readiness_timeout(),
            on_ready: Box::new(move || {
                Box::pin(async move {
                    if let Err(e) = ready.set_status(server_id, ServerStatus::Online).await {
                        error!(server_id = %server_id, error = %e, "Could not mark server online");
                    }
                })
            }),
            on_timeout: Box::new(move || {
                Box::pin(async move { unready.stop_unready(server_id, &node).await })
            }),
        };
        self.inner.probe.register(check);
    }

    /// The container started but never answered: stop it on the node that
    /// reported the start.
    async fn stop_unready(&self, server_id: ServerId, node: &NodeId) {
        error!(server_id = %server_id, node = %node, "Server never became reachable, stopping container");
        if let Err(e) = self.containers(node).stop_container(server_id).await {
            error!(server_id = %server_id, node = %node, error = %e, "Crash recovery stop failed");
        }
    }

    /// Persist a status change and publish it.
    ///
    /// Returns `false` without touching anything when the status is unchanged
    /// or the edge is not part of the status graph.
    pub(crate) async fn set_status(&self, server_id: ServerId, status: ServerStatus) -> Result<bool> {
        let changed = {
            let lock = self.lock_for(server_id);
            let _guard = lock.lock().await;
            self.set_status_locked(server_id, status).await?
        };

        if changed && status == ServerStatus::Offline {
            self.replay_restart(server_id);
        }
        Ok(changed)
    }

    async fn set_status_locked(&self, server_id: ServerId, status: ServerStatus) -> Result<bool> {
        let mut server = self.inner.store.server(server_id).await?;
        let previous = server.status;
        if previous == status {
            return Ok(false);
        }
        if !previous.can_transition_to(status) {
            warn!(server_id = %server_id, from = %previous, to = %status, "Ignoring illegal status transition");
            return Ok(false);
        }

        server.status = status;
        match status {
            ServerStatus::Online => server.last_start = Some(Utc::now()),
            ServerStatus::Offline => server.player_count = 0,
            _ => {}
        }
        self.inner.store.save_server(&server).await?;

        let producer = self.producer(server_id, previous, status);
        info!(server_id = %server_id, from = %previous, to = %status, producer = %producer, "Status changed");
        self.inner.events.publish(ServerEvent::StatusChanged {
            server_id,
            owner_id: server.owner_id,
            previous,
            status,
            producer,
        });
        Ok(true)
    }

    /// Attribute a change to the last acting user unless the system drove it
    /// (coming out of STARTING, or going OFFLINE).
    fn producer(&self, server_id: ServerId, previous: ServerStatus, status: ServerStatus) -> Actor {
        let mut last_actor = self.inner.last_actor.lock();
        let Some(user) = last_actor.get(&server_id).cloned() else {
            return Actor::System;
        };
        if matches!(
            status,
            ServerStatus::Offline | ServerStatus::Online | ServerStatus::Queued
        ) {
            last_actor.remove(&server_id);
        }
        if previous != ServerStatus::Starting && status != ServerStatus::Offline {
            Actor::User(user)
        } else {
            Actor::System
        }
    }

    fn replay_restart(&self, server_id: ServerId) {
        let Some(actor) = self.inner.restarts.lock().remove(&server_id) else {
            return;
        };
        info!(server_id = %server_id, actor = %actor, "Restarting server");
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.start(server_id, actor, None).await {
                error!(server_id = %server_id, error = %e, "Restart failed");
            }
        });
    }
}

#[async_trait]
impl IdleStopper for LifecycleController {
    async fn stop_idle(&self, server_id: ServerId) -> Result<()> {
        self.stop(server_id, Actor::System, false).await
    }
}
