//! Supervised status subscription per runner node.
//!
//! Keeps one status stream open per runner node. Whenever the stream is
//! (re)established after a failure, or on the first connection after process
//! start, the node's persisted servers are reconciled against the containers
//! it actually runs before any further event is applied.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::LifecycleController;
use crate::domain::{NodeId, ServerId, ServerStatus};
use crate::error::{Error, Result, RpcError};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Servers believed active whose container is gone.
    pub forced_offline: usize,
    /// Running containers whose server was not yet ONLINE.
    pub forced_online: usize,
}

/// Reconnect loop for one runner node's status stream.
struct NodeSubscription {
    controller: LifecycleController,
    node: NodeId,
    delay: Duration,
    /// Consecutive failed or lost connections.
    retries: u32,
    /// Set on start and after every failure; cleared by a successful pass.
    needs_reconcile: bool,
}

impl NodeSubscription {
    fn new(controller: LifecycleController, node: NodeId) -> Self {
        let delay = controller.inner.config.reconnect_delay();
        Self {
            controller,
            node,
            delay,
            retries: 0,
            needs_reconcile: true,
        }
    }

    async fn run(mut self) {
        loop {
            self.follow().await;

            self.retries += 1;
            self.needs_reconcile = true;
            warn!(
                node = %self.node,
                retries = self.retries,
                delay_ms = self.delay.as_millis() as u64,
                "Status stream lost, reconnecting after delay"
            );
            sleep(self.delay).await;
        }
    }

    /// Connect, reconcile if needed, and apply events until the stream ends.
    async fn follow(&mut self) {
        let containers = self.controller.containers(&self.node);
        let mut stream = match containers.status_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(node = %self.node, error = %e, "Status stream connect failed");
                return;
            }
        };

        if self.retries > 0 {
            info!(node = %self.node, retries = self.retries, "Status stream re-established");
        }
        self.retries = 0;

        if self.needs_reconcile {
            match self.controller.reconcile_node(&self.node).await {
                Ok(report) => {
                    info!(
                        node = %self.node,
                        forced_offline = report.forced_offline,
                        forced_online = report.forced_online,
                        "Node reconciled"
                    );
                    self.needs_reconcile = false;
                }
                Err(e) => error!(node = %self.node, error = %e, "Reconciliation failed"),
            }
        }

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => self.controller.handle_status_event(&self.node, event).await,
                Err(RpcError::Decode { what, reason }) => {
                    warn!(node = %self.node, what, reason = %reason, "Skipping malformed status frame");
                }
                Err(e) => {
                    warn!(node = %self.node, error = %e, "Status stream failed");
                    return;
                }
            }
        }
    }
}

impl LifecycleController {
    /// Follow `node`'s status stream on a dedicated task, forever.
    pub fn subscribe_node(&self, node: NodeId) -> JoinHandle<()> {
        info!(node = %node, "Subscribing to runner node");
        tokio::spawn(NodeSubscription::new(self.clone(), node).run())
    }

    /// Subscribe to every known runner node.
    pub async fn subscribe_all(&self) -> Result<Vec<JoinHandle<()>>> {
        let nodes = self.inner.store.runner_nodes().await?;
        Ok(nodes.into_iter().map(|node| self.subscribe_node(node)).collect())
    }

    /// Bring persisted status in line with what `node` actually runs.
    ///
    /// Only servers whose persisted runner node is `node` are forced OFFLINE.
    /// Running containers are forced ONLINE (via STARTING when needed) and
    /// pinned to `node`.
    pub async fn reconcile_node(&self, node: &NodeId) -> Result<ReconcileReport> {
        let running: HashSet<ServerId> = self
            .containers(node)
            .running_containers()
            .await?
            .into_iter()
            .collect();
        let mut report = ReconcileReport::default();

        let active = self
            .inner
            .store
            .servers_with_status(&ServerStatus::ACTIVE)
            .await?;
        for server in active {
            if server.runner_node_id.as_ref() != Some(node) || running.contains(&server.id) {
                continue;
            }
            self.inner.probe.remove(server.id);
            if self.set_status(server.id, ServerStatus::Offline).await? {
                report.forced_offline += 1;
            }
        }

        for server_id in running {
            let server = match self.inner.store.server(server_id).await {
                Ok(server) => server,
                Err(Error::ServerNotFound(_)) => {
                    warn!(node = %node, server_id = %server_id, "Node runs a container for an unknown server");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if server.runner_node_id.as_ref() != Some(node) {
                self.inner.scheduler.pin_runner_node(server_id, node).await?;
            }

            match server.status {
                ServerStatus::Online => {}
                ServerStatus::Starting | ServerStatus::Stopping => {
                    self.inner.probe.remove(server_id);
                    self.set_status(server_id, ServerStatus::Online).await?;
                    report.forced_online += 1;
                }
                ServerStatus::Offline | ServerStatus::Queued => {
                    self.set_status(server_id, ServerStatus::Starting).await?;
                    self.set_status(server_id, ServerStatus::Online).await?;
                    report.forced_online += 1;
                }
                other => {
                    warn!(node = %node, server_id = %server_id, status = %other, "Running container for a server that cannot be online");
                }
            }
        }

        Ok(report)
    }
}
