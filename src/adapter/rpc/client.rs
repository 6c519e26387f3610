//! HTTP + WebSocket client for runner and storage node services.
//!
//! Unary calls are JSON over HTTP. The status stream and console attach are
//! WebSocket connections. Every failure is folded into [`RpcError`] here so
//! callers never see `reqwest` or `tungstenite` types.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use super::dto::{
    Exists, ExecBody, ExtensionBody, InstalledExtensions, NodeStatsBody, PathBody, Reply,
    RunningContainers, ServerIdBody, StartBody, StatusFrame,
};
use crate::app::config::RpcConfig;
use crate::domain::{NodeStats, ServerId, StatusEvent};
use crate::error::RpcError;
use crate::port::{
    ChannelAddress, ConsoleSession, ContainerService, ExtensionsService, FilesService,
    InstalledExtension, StartContainerRequest, StartOutcome, StatusStream, TerminalSize,
};

/// Buffered console chunks in each direction.
const CONSOLE_BUFFER: usize = 64;

/// A channel to one node.
///
/// Cheap to clone; the underlying `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: Client,
    base_url: String,
    ws_url: String,
    address: ChannelAddress,
}

impl NodeClient {
    #[must_use]
    pub fn new(http: Client, config: &RpcConfig, address: ChannelAddress) -> Self {
        let host = address.host();
        let port = config.port(address.role);
        Self {
            http,
            base_url: format!("{}://{host}:{port}", config.scheme),
            ws_url: format!("{}://{host}:{port}", config.ws_scheme()),
            address,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn address(&self) -> &ChannelAddress {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn ws_endpoint(&self, path: &str) -> Result<url::Url, RpcError> {
        url::Url::parse(&format!("{}{path}", self.ws_url))
            .map_err(|e| RpcError::Transport(e.to_string()))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<Response, RpcError> {
        trace!(node = %self.address, path, "RPC call");
        let response = self.http.post(self.url(path)).json(body).send().await?;
        check_status(response, operation)
    }

    async fn get(&self, path: &str, operation: &'static str) -> Result<Response, RpcError> {
        trace!(node = %self.address, path, "RPC call");
        let response = self.http.get(self.url(path)).send().await?;
        check_status(response, operation)
    }

    async fn post_reply<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<Reply, RpcError> {
        Ok(self.post(path, body, operation).await?.json::<Reply>().await?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> Result<T, RpcError> {
        Ok(self.get(path, operation).await?.json::<T>().await?)
    }
}

fn check_status(response: Response, operation: &'static str) -> Result<Response, RpcError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RpcError::Remote {
            operation,
            reason: format!("HTTP {status}"),
        })
    }
}

fn decode_frame(text: &str) -> Option<Result<StatusEvent, RpcError>> {
    match serde_json::from_str::<StatusFrame>(text) {
        Ok(frame) => frame.into_event().map(Ok),
        Err(e) => Some(Err(RpcError::Decode {
            what: "status frame",
            reason: e.to_string(),
        })),
    }
}

#[async_trait]
impl ContainerService for NodeClient {
    async fn start_container(
        &self,
        request: &StartContainerRequest,
    ) -> Result<StartOutcome, RpcError> {
        self.post_reply("/containers/start", &StartBody::from(request), "startContainer")
            .await?
            .into_start_outcome()
    }

    async fn stop_container(&self, server_id: ServerId) -> Result<(), RpcError> {
        self.post_reply("/containers/stop", &ServerIdBody { server_id }, "stopContainer")
            .await?
            .into_ok("stopContainer")
    }

    async fn running_containers(&self) -> Result<Vec<ServerId>, RpcError> {
        let body: RunningContainers = self.get_json("/containers", "getRunningContainers").await?;
        Ok(body.servers)
    }

    async fn node_stats(&self) -> Result<NodeStats, RpcError> {
        let body: NodeStatsBody = self.get_json("/node/stats", "getNodeStats").await?;
        Ok(body.into())
    }

    async fn status_stream(&self) -> Result<StatusStream, RpcError> {
        let url = self.ws_endpoint("/containers/status")?;
        info!(node = %self.address, url = %url, "Opening status stream");

        let (ws, response) = connect_async(url.as_str()).await?;
        debug!(node = %self.address, status = %response.status(), "Status stream connected");

        let stream = ws.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => decode_frame(&text),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => decode_frame(text),
                    Err(e) => Some(Err(RpcError::Decode {
                        what: "status frame",
                        reason: e.to_string(),
                    })),
                },
                // Close ends the underlying stream on the next poll.
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            }
        });

        Ok(stream.boxed())
    }

    async fn attach_console(
        &self,
        server_id: ServerId,
        size: TerminalSize,
    ) -> Result<ConsoleSession, RpcError> {
        let mut url = self.ws_endpoint(&format!("/containers/{server_id}/console"))?;
        url.query_pairs_mut()
            .append_pair("rows", &size.rows.to_string())
            .append_pair("cols", &size.cols.to_string());
        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut source) = ws.split();

        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(CONSOLE_BUFFER);
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(CONSOLE_BUFFER);

        tokio::spawn(async move {
            while let Some(chunk) = input_rx.recv().await {
                if sink.send(Message::Binary(chunk)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let node = self.address.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let chunk = match message {
                    Ok(Message::Binary(bytes)) => bytes,
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(node = %node, server_id = %server_id, error = %e, "Console stream failed");
                        break;
                    }
                };
                if output_tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(ConsoleSession {
            input: input_tx,
            output: output_rx,
        })
    }

    async fn exec_command(&self, server_id: ServerId, command: &str) -> Result<(), RpcError> {
        self.post_reply(
            "/containers/exec",
            &ExecBody { server_id, command },
            "execCommand",
        )
        .await?
        .into_ok("execCommand")
    }
}

#[async_trait]
impl FilesService for NodeClient {
    async fn exists(&self, path: &str) -> Result<bool, RpcError> {
        let response = self.post("/files/exists", &PathBody { path }, "exists").await?;
        Ok(response.json::<Exists>().await?.exists)
    }

    async fn create_folder(&self, path: &str) -> Result<(), RpcError> {
        self.post_reply("/files/folder", &PathBody { path }, "createFolder")
            .await?
            .into_ok("createFolder")
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RpcError> {
        let response = self
            .http
            .put(self.url("/files/content"))
            .query(&[("path", path)])
            .body(content.to_vec())
            .send()
            .await?;
        check_status(response, "writeFile")?
            .json::<Reply>()
            .await?
            .into_ok("writeFile")
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RpcError> {
        let response = self
            .http
            .get(self.url("/files/content"))
            .query(&[("path", path)])
            .send()
            .await?;
        let bytes = check_status(response, "readFile")?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<(), RpcError> {
        self.post_reply("/files/delete", &PathBody { path }, "delete")
            .await?
            .into_ok("delete")
    }

    async fn move_to_cold_storage(&self, server_id: ServerId) -> Result<(), RpcError> {
        self.post_reply(
            "/files/cold-storage/upload",
            &ServerIdBody { server_id },
            "moveToColdStorage",
        )
        .await?
        .into_ok("moveToColdStorage")
    }

    async fn load_from_cold_storage(&self, server_id: ServerId) -> Result<(), RpcError> {
        self.post_reply(
            "/files/cold-storage/download",
            &ServerIdBody { server_id },
            "loadFromColdStorage",
        )
        .await?
        .into_ok("loadFromColdStorage")
    }
}

#[async_trait]
impl ExtensionsService for NodeClient {
    async fn installed(&self, server_id: ServerId) -> Result<Vec<InstalledExtension>, RpcError> {
        let response = self
            .post("/extensions/installed", &ServerIdBody { server_id }, "installed")
            .await?;
        Ok(response.json::<InstalledExtensions>().await?.extensions)
    }

    async fn install(&self, server_id: ServerId, version_id: u64) -> Result<(), RpcError> {
        self.post_reply(
            "/extensions/install",
            &ExtensionBody {
                server_id,
                version_id,
            },
            "install",
        )
        .await?
        .into_ok("install")
    }

    async fn uninstall(&self, server_id: ServerId, version_id: u64) -> Result<(), RpcError> {
        self.post_reply(
            "/extensions/uninstall",
            &ExtensionBody {
                server_id,
                version_id,
            },
            "uninstall",
        )
        .await?
        .into_ok("uninstall")
    }
}
