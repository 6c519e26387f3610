//! Single readiness attempt over TCP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::codec::{handshake, parse_status_response, STATUS_REQUEST};
use crate::app::config::ProbeConfig;
use crate::error::ProbeError;

/// One application-level status check against `host:port`.
#[async_trait]
pub trait StatusCheck: Send + Sync {
    async fn check_status(&self, host: &str, port: u16) -> Result<Value, ProbeError>;
}

/// Status check speaking the server list ping protocol.
#[derive(Debug, Clone)]
pub struct PingClient {
    socket_timeout: Duration,
    handshake_host: String,
    protocol_version: i32,
}

impl PingClient {
    #[must_use]
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            socket_timeout: config.socket_timeout(),
            handshake_host: config.handshake_host.clone(),
            protocol_version: config.protocol_version,
        }
    }

    fn request(&self, port: u16) -> Vec<u8> {
        let mut request = handshake(self.protocol_version, &self.handshake_host, port);
        request.extend_from_slice(&STATUS_REQUEST);
        request
    }

    async fn exchange(&self, host: &str, port: u16) -> Result<Value, ProbeError> {
        let stream = TcpStream::connect((host, port)).await?;
        converse(stream, &self.request(port)).await
    }
}

/// Writes `request` and reads until a complete status response arrives.
async fn converse<S>(mut stream: S, request: &[u8]) -> Result<Value, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await?;

    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ProbeError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(value) = parse_status_response(&buf)? {
            return Ok(value);
        }
    }
}

#[async_trait]
impl StatusCheck for PingClient {
    async fn check_status(&self, host: &str, port: u16) -> Result<Value, ProbeError> {
        timeout(self.socket_timeout, self.exchange(host, port))
            .await
            .map_err(|_| ProbeError::Timeout(self.socket_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::super::codec::encode_varint;
    use super::*;

    fn response(json: &str) -> Vec<u8> {
        let mut body = vec![0x00];
        encode_varint(json.len() as i32, &mut body);
        body.extend_from_slice(json.as_bytes());
        let mut framed = Vec::new();
        encode_varint(body.len() as i32, &mut framed);
        framed.extend_from_slice(&body);
        framed
    }

    fn client() -> PingClient {
        PingClient::new(&ProbeConfig::default())
    }

    #[tokio::test]
    async fn sends_handshake_then_status_request() {
        let client = client();
        let request = client.request(25565);
        let reply = response(r#"{"players":{"online":0}}"#);
        let (head, tail) = reply.split_at(3);
        let stream = Builder::new().write(&request).read(head).read(tail).build();

        let value = converse(stream, &request).await.unwrap();

        assert_eq!(value["players"]["online"], 0);
        assert!(request.ends_with(&STATUS_REQUEST));
    }

    #[tokio::test]
    async fn closed_before_response_is_reported() {
        let request = client().request(25565);
        let stream = Builder::new().write(&request).read(&[0x05, 0x00]).build();

        let err = converse(stream, &request).await.unwrap_err();

        assert!(matches!(err, ProbeError::ConnectionClosed));
    }
}
