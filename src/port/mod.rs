//! Ports: the traits the control plane talks through.
//!
//! - [`store`] - persisted servers, owners and node affinity
//! - [`container`] - runner-node container service (the relay)
//! - [`storage`] - storage-node files and extensions services
//! - [`connector`] - opens channels to nodes
//! - [`notifier`] - outbound event consumers

pub mod connector;
pub mod container;
pub mod notifier;
pub mod storage;
pub mod store;

pub use connector::{ChannelAddress, Connector, StorageChannel};
pub use container::{
    ConsoleSession, ContainerService, StartContainerRequest, StartOutcome, StatusStream,
    TerminalSize, ENV_OWNER_ID, ENV_OWNER_NAME, ENV_SERVER_ID,
};
pub use notifier::{Notifier, NotifierRegistry};
pub use storage::{ExtensionsService, FilesService, InstalledExtension};
pub use store::ServerStore;
