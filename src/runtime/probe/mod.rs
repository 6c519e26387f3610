//! Readiness probe.
//!
//! Containers report "started" as soon as their process runs; the probe
//! decides when the game server actually answers. A single loop walks all
//! pending checks once per tick. Each check either succeeds (ready callback,
//! entry removed), fails quietly (retried next tick), or outlives its
//! deadline (timeout callback, entry removed).

mod client;
pub mod codec;

pub use client::{PingClient, StatusCheck};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::ServerId;

/// Callback fired at most once when a check resolves.
pub type ProbeCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// How long a tick waits on one callback before leaving it to finish in
/// the background.
const CALLBACK_BUDGET: Duration = Duration::from_secs(2);

/// Await `callback` for at most [`CALLBACK_BUDGET`], then detach it.
async fn settle(server_id: ServerId, mut callback: BoxFuture<'static, ()>) {
    if timeout(CALLBACK_BUDGET, &mut callback).await.is_err() {
        warn!(server_id = %server_id, "Readiness callback is slow, finishing in background");
        tokio::spawn(callback);
    }
}

/// A registered readiness check.
pub struct PendingCheck {
    pub server_id: ServerId,
    pub host: String,
    pub port: u16,
    pub deadline: Instant,
    pub on_ready: ProbeCallback,
    pub on_timeout: ProbeCallback,
}

impl fmt::Debug for PendingCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCheck")
            .field("server_id", &self.server_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Pending readiness checks plus the loop that drives them.
#[derive(Clone)]
pub struct ReadinessProbe {
    pending: Arc<Mutex<HashMap<ServerId, PendingCheck>>>,
    checker: Arc<dyn StatusCheck>,
    tick: Duration,
}

impl ReadinessProbe {
    #[must_use]
    pub fn new(checker: Arc<dyn StatusCheck>, tick: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            checker,
            tick,
        }
    }

    /// Register a check. A server has at most one pending check; returns
    /// `false` and drops `check` if one is already registered.
    pub fn register(&self, check: PendingCheck) -> bool {
        let mut pending = self.pending.lock();
        if pending.contains_key(&check.server_id) {
            debug!(server_id = %check.server_id, "Readiness check already pending");
            return false;
        }
        debug!(server_id = %check.server_id, host = %check.host, port = check.port, "Readiness check registered");
        pending.insert(check.server_id, check);
        true
    }

    /// Drop a pending check without firing any callback.
    pub fn remove(&self, server_id: ServerId) -> bool {
        self.pending.lock().remove(&server_id).is_some()
    }

    #[must_use]
    pub fn is_pending(&self, server_id: ServerId) -> bool {
        self.pending.lock().contains_key(&server_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one probe round.
    pub async fn tick(&self) {
        let now = Instant::now();
        let (expired, due) = {
            let mut pending = self.pending.lock();
            let expired_ids: Vec<ServerId> = pending
                .values()
                .filter(|c| now > c.deadline)
                .map(|c| c.server_id)
                .collect();
            let expired: Vec<PendingCheck> = expired_ids
                .iter()
                .filter_map(|id| pending.remove(id))
                .collect();
            let due: Vec<(ServerId, String, u16)> = pending
                .values()
                .map(|c| (c.server_id, c.host.clone(), c.port))
                .collect();
            (expired, due)
        };

        let timeouts = expired.into_iter().map(|check| {
            warn!(server_id = %check.server_id, host = %check.host, "Readiness check timed out");
            settle(check.server_id, (check.on_timeout)())
        });
        join_all(timeouts).await;

        let attempts = due.into_iter().map(|(server_id, host, port)| {
            let checker = self.checker.clone();
            async move {
                let result = checker.check_status(&host, port).await;
                (server_id, result)
            }
        });

        let mut ready = Vec::new();
        for (server_id, result) in join_all(attempts).await {
            match result {
                Ok(_) => {
                    // Removed in the meantime (stop event, restart) means no callback.
                    let Some(check) = self.pending.lock().remove(&server_id) else {
                        continue;
                    };
                    info!(server_id = %server_id, "Server is answering");
                    ready.push(settle(server_id, (check.on_ready)()));
                }
                Err(e) => {
                    debug!(server_id = %server_id, error = %e, "Readiness attempt failed");
                }
            }
        }
        join_all(ready).await;
    }

    /// Tick forever.
    pub async fn run(self) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}
