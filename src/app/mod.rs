//! Application layer - configuration and process bootstrap.

mod bootstrap;
pub mod config;

pub use bootstrap::{build_notifier_registry, App, ControlPlane};
pub use config::Config;
