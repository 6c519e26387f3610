//! Domain types: identifiers, servers, nodes and events.
//!
//! Everything here is plain data plus pure rules (status graph, memory
//! sizing). No I/O.

pub mod event;
pub mod id;
pub mod node;
pub mod server;

pub use event::{ContainerStats, ContainerStatus, ServerEvent, StatusEvent, StatusPayload};
pub use id::{Actor, NodeId, ServerId, UserId};
pub use node::{
    host_ram_reserve, memory_buffer_bytes, working_memory_bytes, NodeCandidate, NodeRole,
    NodeStats, BYTES_PER_MB, DEFAULT_MEMORY_BUFFER_CAP_MB,
};
pub use server::{
    container_name, render_start_command, Owner, PlayerCountUpdate, Server, ServerStatus, VersionRef,
};
