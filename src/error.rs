use thiserror::Error;

use crate::domain::{NodeId, ServerId, ServerStatus, UserId};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors at the node RPC boundary.
///
/// Every remote call returns this type; callers above the RPC layer fold it
/// into [`Error::Internal`] so transport detail never reaches unrelated callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{operation} rejected by node: {reason}")]
    Remote {
        operation: &'static str,
        reason: String,
    },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("stream closed")]
    StreamClosed,
}

impl RpcError {
    /// Whether the failure happened before the node could answer.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                what: "response",
                reason: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Readiness probe attempt failures. All of them are retried on the next tick.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("VarInt is too big")]
    VarIntTooLong,

    #[error("unexpected packet id {0:#04x}")]
    UnexpectedPacket(u8),

    #[error("invalid length {0}")]
    InvalidLength(i32),

    #[error("connection closed before a full response")]
    ConnectionClosed,

    #[error("status payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by a container engine underneath the relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no container carries server id {0}")]
    ContainerNotFound(ServerId),

    #[error("image pull failed: {0}")]
    Pull(String),

    #[error("engine request failed: {0}")]
    Request(String),

    #[error("no host path mapped for storage node {0}")]
    UnknownStorageNode(NodeId),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server {server_id} is {actual}, expected {expected}")]
    WrongState {
        server_id: ServerId,
        expected: ServerStatus,
        actual: ServerStatus,
    },

    #[error("owner {owner} ram limit reached: {in_use_mb} + {requested_mb} > {limit_mb} MB")]
    OwnerRamLimit {
        owner: UserId,
        in_use_mb: u64,
        requested_mb: u64,
        limit_mb: u64,
    },

    #[error("system capacity reached")]
    SystemAtCapacity,

    #[error("no node available for storage node {storage_node}")]
    NoNodeAvailable { storage_node: NodeId },

    #[error("server {0} not found")]
    ServerNotFound(ServerId),

    #[error("owner {0} not found")]
    OwnerNotFound(UserId),

    #[error("internal error")]
    Internal(#[source] RpcError),

    #[error("archive step '{step}' failed for server {server_id}")]
    Archive {
        server_id: ServerId,
        step: &'static str,
        #[source]
        source: Option<RpcError>,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<RpcError> for Error {
    fn from(err: RpcError) -> Self {
        Error::Internal(err)
    }
}
