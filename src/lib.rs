//! Hostplane - orchestration control plane for hosted game servers.
//!
//! Servers run in containers on runner nodes and keep their files on storage
//! nodes. The control plane decides where a server runs, drives its
//! container through the status graph, confirms the game endpoint actually
//! answers, reconciles after connectivity loss, enforces owner ram budgets
//! and stops idle servers.
//!
//! # Modules
//!
//! - [`domain`] - Ids, servers and the status graph, node stats, events
//! - [`port`] - Traits at the store, node RPC and notifier seams
//! - [`adapter`] - HTTP/WebSocket node client, in-memory store, notifiers
//! - [`runtime`] - Scheduler, readiness probe, lifecycle controller, idle watcher
//! - [`relay`] - Node-side container relay over a container engine
//! - [`app`] - Configuration and process bootstrap
//! - [`cli`] - Command-line interface
//! - [`error`] - Error types for the crate
//!
//! # Features
//!
//! - `testkit` - Expose the [`testkit`] fakes to integration tests

pub mod adapter;
pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod port;
pub mod relay;
pub mod runtime;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
