//! Container lifecycle relay.
//!
//! Runs next to the container engine on every runner node and serves the
//! [`ContainerService`] port: it launches and stops labelled server
//! containers, follows the engine's event feed, and fans status changes and
//! stats samples out to every status stream subscriber.
//!
//! Containers are correlated to servers by the [`SERVER_ID_LABEL`] label.

pub mod engine;

pub use engine::{
    ContainerEngine, ContainerSpec, EngineAction, EngineEvent, EngineEventStream, HostMemory,
    StatsStream,
};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::app::config::RelayConfig;
use crate::domain::{
    container_name, host_ram_reserve, ContainerStatus, NodeStats, ServerId, StatusEvent,
};
use crate::error::{EngineError, RpcError};
use crate::port::{
    ConsoleSession, ContainerService, StartContainerRequest, StartOutcome, StatusStream,
    TerminalSize,
};

/// Label carrying the owning server id on every managed container.
pub const SERVER_ID_LABEL: &str = "hostplane.server-id";

/// Environment variable telling the server which hostnames belong to peers.
pub const ENV_DISALLOWED_HOSTNAME_PREFIX: &str = "DISALLOWED_HOSTNAME_PREFIX";

/// Mount point and working directory of the server folder.
pub const SERVER_ROOT: &str = "/home/server";

fn remote(operation: &'static str) -> impl Fn(EngineError) -> RpcError {
    move |err| RpcError::Remote {
        operation,
        reason: err.to_string(),
    }
}

struct RelayInner<E> {
    engine: Arc<E>,
    config: RelayConfig,
    status: broadcast::Sender<StatusEvent>,
    /// Containers with a live stats feed.
    tracked: Mutex<HashSet<String>>,
}

pub struct Relay<E: ContainerEngine> {
    inner: Arc<RelayInner<E>>,
}

impl<E: ContainerEngine> Clone for Relay<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: ContainerEngine> Relay<E> {
    #[must_use]
    pub fn new(engine: Arc<E>, config: RelayConfig) -> Self {
        let (status, _) = broadcast::channel(config.subscriber_capacity);
        Self {
            inner: Arc::new(RelayInner {
                engine,
                config,
                status,
                tracked: Mutex::new(HashSet::new()),
            }),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<E> {
        &self.inner.engine
    }

    /// Number of open status streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.status.receiver_count()
    }

    fn emit(&self, event: StatusEvent) {
        // Nobody listening is fine.
        let _ = self.inner.status.send(event);
    }

    fn emit_change(&self, server_id: ServerId, status: ContainerStatus) {
        debug!(server_id = %server_id, status = ?status, "Container status");
        self.emit(StatusEvent::change(server_id, status));
    }

    /// Build the container definition for a start request.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownStorageNode`] when no host path is configured
    /// for the request's storage node.
    pub fn container_spec(
        &self,
        request: &StartContainerRequest,
    ) -> Result<ContainerSpec, EngineError> {
        let config = &self.inner.config;
        let root = config
            .storage_paths
            .get(&request.storage_node)
            .ok_or_else(|| EngineError::UnknownStorageNode(request.storage_node.clone()))?;
        let id = request.server_id;

        let mut env: Vec<String> = request
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        env.push(format!(
            "{ENV_DISALLOWED_HOSTNAME_PREFIX}={}gameserver",
            config.container_prefix
        ));

        Ok(ContainerSpec {
            name: container_name(&config.container_prefix, id),
            image: request.image.clone(),
            command: request
                .start_command
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            env,
            memory_bytes: (!config.ignore_ram_limit).then_some(request.ram_bytes),
            network: config.network.clone(),
            mount_source: root.join(id.to_string()),
            mount_target: SERVER_ROOT.to_owned(),
            working_dir: SERVER_ROOT.to_owned(),
            labels: BTreeMap::from([(SERVER_ID_LABEL.to_owned(), id.to_string())]),
            auto_remove: true,
        })
    }

    async fn find_container(&self, server_id: ServerId) -> Result<Option<String>, EngineError> {
        let value = server_id.to_string();
        let found = self
            .inner
            .engine
            .list_by_label(SERVER_ID_LABEL, Some(&value))
            .await?;
        Ok(found.into_iter().next().map(|(container_id, _)| container_id))
    }

    async fn require_container(
        &self,
        server_id: ServerId,
        operation: &'static str,
    ) -> Result<String, RpcError> {
        self.find_container(server_id)
            .await
            .map_err(remote(operation))?
            .ok_or_else(|| remote(operation)(EngineError::ContainerNotFound(server_id)))
    }

    /// Create and start the container. Failures surface as `could-not-start`.
    async fn launch(&self, server_id: ServerId, spec: ContainerSpec) {
        let container_id = match self.inner.engine.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => {
                error!(server_id = %server_id, error = %e, "Container create failed");
                self.emit_change(server_id, ContainerStatus::CouldNotStart);
                return;
            }
        };
        if let Err(e) = self.inner.engine.start_container(&container_id).await {
            error!(server_id = %server_id, container = %container_id, error = %e, "Container start failed");
            self.emit_change(server_id, ContainerStatus::CouldNotStart);
        }
    }

    // ---- Engine event feed ----

    /// Follow the engine event feed on a dedicated task, re-subscribing
    /// whenever it ends.
    pub fn spawn_event_feed(&self) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move { relay.run_event_feed().await })
    }

    async fn run_event_feed(self) {
        let delay = self.inner.config.feed_reconnect_delay();
        loop {
            match self.inner.engine.events().await {
                Ok(mut feed) => {
                    info!("Engine event feed connected");
                    while let Some(item) = feed.next().await {
                        match item {
                            Ok(event) => self.handle_engine_event(event),
                            Err(e) => warn!(error = %e, "Skipping unreadable engine event"),
                        }
                    }
                    warn!("Engine event feed ended");
                }
                Err(e) => error!(error = %e, "Engine event feed unavailable"),
            }
            sleep(delay).await;
        }
    }

    /// Translate one engine event into status stream messages.
    pub fn handle_engine_event(&self, event: EngineEvent) {
        let Some(server_id) = event
            .labels
            .get(SERVER_ID_LABEL)
            .and_then(|value| value.parse::<u64>().ok())
            .map(ServerId::new)
        else {
            return;
        };

        match event.action {
            EngineAction::Start => {
                self.emit_change(server_id, ContainerStatus::Started);
                self.follow_stats(event.container_id, server_id);
            }
            EngineAction::Destroy => {
                self.inner.tracked.lock().remove(&event.container_id);
                self.emit_change(server_id, ContainerStatus::Stopped);
            }
            EngineAction::Other => {}
        }
    }

    fn is_tracked(&self, container_id: &str) -> bool {
        self.inner.tracked.lock().contains(container_id)
    }

    /// Forward stats samples until the container is destroyed.
    fn follow_stats(&self, container_id: String, server_id: ServerId) {
        if !self.inner.tracked.lock().insert(container_id.clone()) {
            return;
        }
        let relay = self.clone();
        tokio::spawn(async move {
            while relay.is_tracked(&container_id) {
                match relay.inner.engine.stats(&container_id).await {
                    Ok(mut samples) => {
                        while let Some(sample) = samples.next().await {
                            if let Ok(stats) = sample {
                                relay.emit(StatusEvent::stats(server_id, stats));
                            }
                        }
                    }
                    Err(e) => {
                        debug!(server_id = %server_id, error = %e, "Stats feed closed");
                        break;
                    }
                }
                sleep(relay.inner.config.feed_reconnect_delay()).await;
            }
            relay.inner.tracked.lock().remove(&container_id);
        });
    }
}

#[async_trait]
impl<E: ContainerEngine> ContainerService for Relay<E> {
    async fn start_container(
        &self,
        request: &StartContainerRequest,
    ) -> Result<StartOutcome, RpcError> {
        let server_id = request.server_id;
        let memory = self
            .inner
            .engine
            .host_memory()
            .await
            .map_err(remote("start"))?;
        let reserve = host_ram_reserve(self.inner.config.ram_buffer_bytes, memory.total);
        if memory.free < request.ram_bytes.saturating_add(reserve) {
            warn!(
                server_id = %server_id,
                free = memory.free,
                requested = request.ram_bytes,
                reserve,
                "Host is full"
            );
            return Ok(StartOutcome::Full);
        }

        let spec = self.container_spec(request).map_err(remote("start"))?;
        self.emit_change(server_id, ContainerStatus::Starting);

        if let Err(e) = self.inner.engine.pull_image(&request.image).await {
            error!(server_id = %server_id, image = %request.image, error = %e, "Image pull failed");
            self.emit_change(server_id, ContainerStatus::CouldNotStart);
            return Err(remote("start")(e));
        }

        let relay = self.clone();
        tokio::spawn(async move { relay.launch(server_id, spec).await });
        Ok(StartOutcome::Accepted)
    }

    async fn stop_container(&self, server_id: ServerId) -> Result<(), RpcError> {
        let container_id = self.require_container(server_id, "stop").await?;
        self.emit_change(server_id, ContainerStatus::Stopping);

        let relay = self.clone();
        tokio::spawn(async move {
            if let Err(e) = relay.inner.engine.stop_container(&container_id).await {
                error!(server_id = %server_id, container = %container_id, error = %e, "Container stop failed");
                relay.emit_change(server_id, ContainerStatus::CouldNotStop);
            }
        });
        Ok(())
    }

    async fn running_containers(&self) -> Result<Vec<ServerId>, RpcError> {
        let labelled = self
            .inner
            .engine
            .list_by_label(SERVER_ID_LABEL, None)
            .await
            .map_err(remote("list containers"))?;

        Ok(labelled
            .into_iter()
            .filter_map(|(container_id, value)| match value.parse::<u64>() {
                Ok(id) => Some(ServerId::new(id)),
                Err(_) => {
                    warn!(container = %container_id, label = %value, "Ignoring container with malformed server label");
                    None
                }
            })
            .collect())
    }

    async fn node_stats(&self) -> Result<NodeStats, RpcError> {
        let memory = self
            .inner
            .engine
            .host_memory()
            .await
            .map_err(remote("node stats"))?;
        Ok(NodeStats {
            cpu_usage: 0,
            total_ram: memory.total,
            free_ram: memory.free,
        })
    }

    async fn status_stream(&self) -> Result<StatusStream, RpcError> {
        let rx = self.inner.status.subscribe();
        let events = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Status subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(events.boxed())
    }

    async fn attach_console(
        &self,
        server_id: ServerId,
        size: TerminalSize,
    ) -> Result<ConsoleSession, RpcError> {
        let container_id = self.require_container(server_id, "attach").await?;
        self.inner
            .engine
            .attach(&container_id, size)
            .await
            .map_err(remote("attach"))
    }

    async fn exec_command(&self, server_id: ServerId, command: &str) -> Result<(), RpcError> {
        let container_id = self.require_container(server_id, "exec").await?;
        self.inner
            .engine
            .write_stdin(&container_id, command.as_bytes())
            .await
            .map_err(remote("exec"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::domain::NodeId;
    use crate::testkit::engine::MemoryEngine;

    fn request(id: u64, ram_bytes: u64) -> StartContainerRequest {
        StartContainerRequest {
            server_id: ServerId::new(id),
            storage_node: NodeId::new("s1"),
            image: "games/paper:1.20".into(),
            ram_bytes,
            start_command: "java -Xmx1024M -jar server.jar".into(),
            env: BTreeMap::from([("SERVER_ID".to_string(), id.to_string())]),
        }
    }

    fn relay(prefix: &str) -> Relay<MemoryEngine> {
        let config = RelayConfig {
            container_prefix: prefix.into(),
            storage_paths: BTreeMap::from([(NodeId::new("s1"), PathBuf::from("/srv/s1"))]),
            ..RelayConfig::default()
        };
        Relay::new(Arc::new(MemoryEngine::new(16_000, 8_000)), config)
    }

    #[test]
    fn container_spec_carries_label_name_and_mount() {
        let spec = relay("staging-").container_spec(&request(42, 1_000)).unwrap();

        assert_eq!(spec.name, "staging-gameserver-42");
        assert_eq!(spec.labels.get(SERVER_ID_LABEL).map(String::as_str), Some("42"));
        assert_eq!(spec.mount_source, PathBuf::from("/srv/s1/42"));
        assert_eq!(spec.mount_target, SERVER_ROOT);
        assert_eq!(spec.command, vec!["java", "-Xmx1024M", "-jar", "server.jar"]);
        assert_eq!(spec.memory_bytes, Some(1_000));
        assert!(spec.env.contains(&"SERVER_ID=42".to_string()));
        assert!(spec
            .env
            .contains(&"DISALLOWED_HOSTNAME_PREFIX=staging-gameserver".to_string()));
    }

    #[test]
    fn unknown_storage_node_is_rejected() {
        let mut req = request(1, 1_000);
        req.storage_node = NodeId::new("elsewhere");

        let err = relay("").container_spec(&req).unwrap_err();

        assert_eq!(err, EngineError::UnknownStorageNode(NodeId::new("elsewhere")));
    }

    #[tokio::test]
    async fn start_without_headroom_reports_full() {
        // 8000 free, reserve is 10% of 16000 = 1600.
        let relay = relay("");

        let outcome = relay.start_container(&request(1, 6_401)).await.unwrap();

        assert_eq!(outcome, StartOutcome::Full);
        assert_eq!(relay.engine().created(), 0);
    }

    #[test]
    fn events_without_label_are_ignored() {
        let relay = relay("");
        let mut rx = relay.inner.status.subscribe();

        relay.handle_engine_event(EngineEvent {
            action: EngineAction::Destroy,
            container_id: "c1".into(),
            labels: BTreeMap::new(),
        });

        assert!(rx.try_recv().is_err());
    }
}
