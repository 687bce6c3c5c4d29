// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport client.
//!
//! Opens a single bidirectional message stream, exposes inbound text frames
//! as an ordered `mpsc` stream, and exposes a send operation. The inbound
//! channel closing without cancellation signals an unexpected disconnect to
//! the consumer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parlor_core::{Environment, ParlorError, SessionConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the inbound frame channel.
const INBOUND_BUFFER: usize = 128;

/// A connected message-oriented socket.
///
/// Object-safe so the session layer and tests can substitute
/// implementations.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends one text frame.
    async fn send(&self, frame: String) -> Result<(), ParlorError>;

    /// Closes the socket. Idempotent.
    async fn close(&self);
}

/// Inbound side of a connected socket: text frames in arrival order.
///
/// The channel closes when the socket ends. Consumers distinguish an
/// expected teardown from an unexpected drop via the cancellation token.
pub struct SocketEvents {
    pub frames: mpsc::Receiver<String>,
    pub cancel: CancellationToken,
}

/// Opens sockets. The production implementation is [`TungsteniteFactory`];
/// tests substitute a mock.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn ChatTransport>, SocketEvents), ParlorError>;
}

/// Builds the socket connection URL. The query parameter set is a
/// compatibility surface with the server and must be preserved exactly.
pub fn socket_url(environment: &Environment, config: &SessionConfig) -> String {
    format!(
        "{}?brand={}&channelId={}&applicationType={}&os={}&sdkVersion={}",
        environment.socket_url,
        config.brand_id,
        config.channel_id,
        config.app_type,
        config.os,
        config.sdk_version,
    )
}

/// Production WebSocket client over tokio-tungstenite.
pub struct SocketClient {
    writer: Mutex<SplitSink<WsStream, WsMessage>>,
    cancel: CancellationToken,
}

#[async_trait]
impl ChatTransport for SocketClient {
    async fn send(&self, frame: String) -> Result<(), ParlorError> {
        let mut writer = self.writer.lock().await;
        writer
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| ParlorError::transport("failed to send socket frame", e))
    }

    async fn close(&self) {
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(WsMessage::Close(None)).await {
            debug!(error = %e, "close frame not delivered");
        }
    }
}

/// Production [`SocketFactory`] over tokio-tungstenite.
pub struct TungsteniteFactory;

#[async_trait]
impl SocketFactory for TungsteniteFactory {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn ChatTransport>, SocketEvents), ParlorError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ParlorError::transport("socket connect failed", e))?;
        debug!(url, "socket connected");

        let (writer, mut reader) = stream.split();
        let cancel = CancellationToken::new();
        let client = Arc::new(SocketClient {
            writer: Mutex::new(writer),
            cancel: cancel.clone(),
        });

        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let reader_cancel = cancel.clone();
        let pong_client = Arc::clone(&client);

        // Reader task: forwards text frames in arrival order. Dropping `tx`
        // closes the inbound channel, which the dispatcher treats as a
        // disconnect unless the token was cancelled first.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    msg = reader.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if tx.send(text.to_string()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            let mut writer = pong_client.writer.lock().await;
                            if writer.send(WsMessage::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            debug!("socket stream ended");
                            break;
                        }
                        Some(Ok(_)) => {} // Binary and pong frames are ignored.
                        Some(Err(e)) => {
                            warn!(error = %e, "socket read error");
                            break;
                        }
                    }
                }
            }
        });

        Ok((
            client as Arc<dyn ChatTransport>,
            SocketEvents { frames: rx, cancel },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_preserves_query_parameter_set() {
        let env = Environment::custom("https://chat", "wss://gateway", "https://chat");
        let mut config = SessionConfig::new(env.clone(), 1386, "chan-7");
        config.app_type = "native".into();
        config.os = "ios".into();
        config.sdk_version = "2.0.0".into();

        assert_eq!(
            socket_url(&env, &config),
            "wss://gateway?brand=1386&channelId=chan-7&applicationType=native&os=ios&sdkVersion=2.0.0"
        );
    }
}
