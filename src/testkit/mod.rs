//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`containers`] - `ScriptedContainers`, a [`ContainerService`](crate::port::ContainerService)
//!   with call counters, scripted results and a controllable status feed.
//! - [`connector`] - `StubConnector` handing out registered fakes per node.
//! - [`storage`] - In-memory files and extensions services.
//! - [`engine`] - `MemoryEngine`, a container engine for relay tests.
//! - [`probe`] - `ScriptedCheck`, a readiness check that answers on demand.
//! - [`domain`] - Builders for servers, owners and node stats.
//! - [`config`] - Canonical fast test configurations.

pub mod config;
pub mod connector;
pub mod containers;
pub mod domain;
pub mod engine;
pub mod probe;
pub mod storage;
