//! Idle shutdown watcher.
//!
//! Follows player count and status events. An ONLINE server with nobody on
//! it gets an expiry; a periodic sweep stops every server whose expiry has
//! passed. Every empty player report pushes the expiry out again; coming
//! ONLINE only arms a server that has none yet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::{ServerEvent, ServerId, ServerStatus};
use crate::error::Result;

/// Whoever can stop a server on the watcher's behalf.
#[async_trait]
pub trait IdleStopper: Send + Sync {
    async fn stop_idle(&self, server_id: ServerId) -> Result<()>;
}

pub struct IdleShutdownWatcher {
    candidates: Mutex<HashMap<ServerId, Instant>>,
    stopper: Arc<dyn IdleStopper>,
    grace: Duration,
    tick: Duration,
}

impl IdleShutdownWatcher {
    #[must_use]
    pub fn new(stopper: Arc<dyn IdleStopper>, grace: Duration, tick: Duration) -> Self {
        Self {
            candidates: Mutex::new(HashMap::new()),
            stopper,
            grace,
            tick,
        }
    }

    /// Update idle candidates from one event.
    pub fn observe(&self, event: &ServerEvent) {
        match event {
            ServerEvent::PlayerCountUpdated {
                server_id,
                player_count: 0,
                status: ServerStatus::Online,
            } => self.rearm(*server_id),
            ServerEvent::PlayerCountUpdated { server_id, .. } => self.disarm(*server_id),
            ServerEvent::StatusChanged {
                server_id,
                status: ServerStatus::Online,
                ..
            } => self.arm(*server_id),
            ServerEvent::StatusChanged { server_id, .. } => self.disarm(*server_id),
            ServerEvent::StatsSampled { .. } => {}
        }
    }

    fn arm(&self, server_id: ServerId) {
        let expiry = Instant::now() + self.grace;
        self.candidates.lock().entry(server_id).or_insert_with(|| {
            debug!(server_id = %server_id, grace_secs = self.grace.as_secs(), "Idle timer armed");
            expiry
        });
    }

    fn rearm(&self, server_id: ServerId) {
        self.candidates
            .lock()
            .insert(server_id, Instant::now() + self.grace);
        debug!(server_id = %server_id, grace_secs = self.grace.as_secs(), "Idle timer reset");
    }

    fn disarm(&self, server_id: ServerId) {
        if self.candidates.lock().remove(&server_id).is_some() {
            debug!(server_id = %server_id, "Idle timer cleared");
        }
    }

    #[must_use]
    pub fn is_armed(&self, server_id: ServerId) -> bool {
        self.candidates.lock().contains_key(&server_id)
    }

    /// Stop every server whose expiry has passed. Returns how many were stopped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<ServerId> = {
            let mut candidates = self.candidates.lock();
            let ids: Vec<ServerId> = candidates
                .iter()
                .filter(|(_, expiry)| **expiry <= now)
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                candidates.remove(id);
            }
            ids
        };

        let mut stopped = 0;
        for server_id in expired {
            info!(server_id = %server_id, "Stopping idle server");
            match self.stopper.stop_idle(server_id).await {
                Ok(()) => stopped += 1,
                Err(e) => error!(server_id = %server_id, error = %e, "Idle stop failed"),
            }
        }
        stopped
    }

    /// Consume events and sweep on every tick until the event bus closes.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ServerEvent>) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                received = events.recv() => match received {
                    Ok(event) => self.observe(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Idle watcher lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingStopper(AtomicU32);

    #[async_trait]
    impl IdleStopper for CountingStopper {
        async fn stop_idle(&self, _server_id: ServerId) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn players(id: u64, count: u32, status: ServerStatus) -> ServerEvent {
        ServerEvent::PlayerCountUpdated {
            server_id: ServerId::new(id),
            player_count: count,
            status,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_players_while_offline_does_not_arm() {
        let stopper = Arc::new(CountingStopper(AtomicU32::new(0)));
        let watcher =
            IdleShutdownWatcher::new(stopper, Duration::from_secs(300), Duration::from_secs(10));

        watcher.observe(&players(1, 0, ServerStatus::Offline));

        assert!(!watcher.is_armed(ServerId::new(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_zero_counts_reset_the_expiry() {
        let stopper = Arc::new(CountingStopper(AtomicU32::new(0)));
        let watcher = IdleShutdownWatcher::new(
            stopper.clone(),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );

        watcher.observe(&players(1, 0, ServerStatus::Online));
        tokio::time::advance(Duration::from_secs(200)).await;
        watcher.observe(&players(1, 0, ServerStatus::Online));
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(watcher.sweep().await, 0);
        assert!(watcher.is_armed(ServerId::new(1)));

        tokio::time::advance(Duration::from_secs(150)).await;
        assert_eq!(watcher.sweep().await, 1);
        assert_eq!(stopper.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn coming_online_keeps_an_existing_expiry() {
        let stopper = Arc::new(CountingStopper(AtomicU32::new(0)));
        let watcher =
            IdleShutdownWatcher::new(stopper, Duration::from_secs(300), Duration::from_secs(10));
        let id = ServerId::new(1);

        watcher.observe(&players(1, 0, ServerStatus::Online));
        tokio::time::advance(Duration::from_secs(200)).await;
        watcher.observe(&ServerEvent::StatusChanged {
            server_id: id,
            owner_id: crate::domain::UserId::new("u1"),
            previous: ServerStatus::Starting,
            status: ServerStatus::Online,
            producer: crate::domain::Actor::System,
        });
        tokio::time::advance(Duration::from_secs(100)).await;

        assert_eq!(watcher.sweep().await, 1);
    }
}
