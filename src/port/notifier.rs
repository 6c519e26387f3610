//! Notifier port for control-plane events.
//!
//! Notification consumers (websocket gateways, audit logs, chat bots) live
//! outside this crate; they plug in here.

use crate::domain::ServerEvent;

/// Trait for notification handlers.
///
/// Notifications are fire-and-forget. `notify` runs on the dispatch task and
/// should return quickly; spawn for slow I/O.
pub trait Notifier: Send + Sync {
    /// Handle an event.
    fn notify(&self, event: &ServerEvent);

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// Registry of notifiers (composite pattern).
///
/// Broadcasts events to all registered notifiers.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { notifiers: vec![] }
    }

    /// Register a notifier.
    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Notify all registered notifiers.
    pub fn notify_all(&self, event: &ServerEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event);
        }
    }

    /// Names of the registered notifiers.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
