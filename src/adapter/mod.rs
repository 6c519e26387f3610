//! Implementations of ports (hexagonal adapters).

pub mod notifier;
pub mod rpc;
pub mod store;
