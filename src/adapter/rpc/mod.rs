//! Node RPC adapter: JSON over HTTP for unary calls, WebSocket for streams.

mod client;
pub mod dto;

pub use client::NodeClient;

use std::sync::Arc;

use reqwest::Client;

use crate::app::config::RpcConfig;
use crate::error::RpcError;
use crate::port::{ChannelAddress, Connector, ContainerService, StorageChannel};

/// [`Connector`] that opens [`NodeClient`] channels.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: Client,
    config: RpcConfig,
}

impl HttpConnector {
    /// Build the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the TLS backend cannot be initialized.
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn client(&self, address: &ChannelAddress) -> NodeClient {
        NodeClient::new(self.http.clone(), &self.config, address.clone())
    }
}

impl Connector for HttpConnector {
    fn runner(&self, address: &ChannelAddress) -> Arc<dyn ContainerService> {
        Arc::new(self.client(address))
    }

    fn storage(&self, address: &ChannelAddress) -> StorageChannel {
        let client = Arc::new(self.client(address));
        StorageChannel {
            files: client.clone(),
            extensions: client,
        }
    }
}
