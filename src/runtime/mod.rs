//! Control-plane runtime.
//!
//! - [`connection`] - one cached channel per node and role
//! - [`scheduler`] - runner/storage node resolution
//! - [`probe`] - application-level readiness checks
//! - [`lifecycle`] - status authority, subscriptions, reconciliation, archive
//! - [`idle`] - idle shutdown watcher
//! - [`events`] - in-process event bus

pub mod connection;
pub mod events;
pub mod idle;
pub mod lifecycle;
pub mod probe;
pub mod scheduler;

pub use connection::RpcConnectionManager;
pub use events::EventBus;
pub use idle::{IdleShutdownWatcher, IdleStopper};
pub use lifecycle::{
    ArchiveInformation, ArchiveSweeper, LifecycleController, ReconcileReport, ARCHIVE_INFO_FILE,
};
pub use probe::{PendingCheck, PingClient, ReadinessProbe, StatusCheck};
pub use scheduler::{NodeAssignment, NodeScheduler};
