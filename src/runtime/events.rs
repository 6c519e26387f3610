//! In-process event bus.
//!
//! Status changes, player counts and stats samples are broadcast to every
//! subscriber. Slow subscribers lag and lose events; they never block the
//! publisher.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::ServerEvent;
use crate::port::NotifierRegistry;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers.
    pub fn publish(&self, event: ServerEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Forward every event to the registered notifiers on a dedicated task.
    pub fn spawn_notifier_dispatch(&self, registry: NotifierRegistry) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        debug!(notifiers = ?registry.names(), "Starting notifier dispatch");
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => registry.notify_all(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notifier dispatch lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
