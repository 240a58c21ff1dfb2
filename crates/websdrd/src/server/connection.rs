//! Connection handler for individual WebSocket clients.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Registers a session with the registry on connect
//! - Forwards inbound frames to the registry in arrival order
//! - Waits on the session's writable signal and sends one update per wakeup
//! - Tears the session down on close, error or shutdown
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use websdr_core::SessionId;

use crate::registry::{RegistryError, RegistryHandle, WritableSignal};

/// Maximum inbound message size (64 KiB). Larger frames are discarded.
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Connection handler for a single client.
pub struct ConnectionHandler {
    sink: WsSink,
    source: WsSource,
    peer: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a handler for an upgraded WebSocket.
    pub fn new(
        ws: WebSocketStream<TcpStream>,
        peer: SocketAddr,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        let (sink, source) = ws.split();
        Self {
            sink,
            source,
            peer,
            registry,
            cancel_token,
        }
    }

    /// Runs the connection until the client leaves or the server shuts down.
    ///
    /// The session is always removed from the registry before returning.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Rejected` if the registry refused the connection
    /// - `ConnectionError::Registry` if the session vanished or the registry stopped
    /// - `ConnectionError::WebSocket` / `WriteTimeout` on transport failure
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let writable = WritableSignal::new();

        let session_id = match self.registry.on_connect(writable.clone()).await {
            Ok(id) => id,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Connection rejected");
                let _ = self.sink.close().await;
                return Err(ConnectionError::Rejected(e));
            }
        };

        info!(peer = %self.peer, session_id = %session_id, "Client connected");

        let result = self.serve(&session_id, &writable).await;

        self.registry.on_close(session_id.clone()).await;
        let _ = self.sink.close().await;

        match &result {
            Ok(()) => info!(session_id = %session_id, "Client disconnected"),
            Err(e) => debug!(session_id = %session_id, error = %e, "Client dropped"),
        }
        result
    }

    /// Main loop: inbound frames, writable turns and shutdown.
    async fn serve(
        &mut self,
        session_id: &SessionId,
        writable: &WritableSignal,
    ) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!(session_id = %session_id, "Closing connection for shutdown");
                    return Ok(());
                }

                _ = writable.requested() => {
                    let json = self
                        .registry
                        .on_writable(session_id.clone())
                        .await
                        .map_err(ConnectionError::Registry)?;
                    self.send_text(json).await?;
                }

                frame = self.source.next() => {
                    let payload = match frame {
                        None => return Ok(()),
                        Some(Err(e)) => return Err(ConnectionError::websocket(e)),
                        Some(Ok(Message::Close(_))) => return Ok(()),
                        Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                        Some(Ok(Message::Binary(data))) => data.to_vec(),
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                            continue
                        }
                    };

                    if payload.len() > MAX_MESSAGE_SIZE {
                        warn!(
                            session_id = %session_id,
                            size = payload.len(),
                            max = MAX_MESSAGE_SIZE,
                            "Discarding oversized message"
                        );
                        continue;
                    }

                    self.registry
                        .on_message(session_id.clone(), payload)
                        .await
                        .map_err(ConnectionError::Registry)?;
                }
            }
        }
    }

    async fn send_text(&mut self, json: String) -> Result<(), ConnectionError> {
        timeout(WRITE_TIMEOUT, self.sink.send(Message::Text(json.into())))
            .await
            .map_err(|_| ConnectionError::WriteTimeout)?
            .map_err(ConnectionError::websocket)
    }
}

/// Errors that end a single connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Connection rejected: {0}")]
    Rejected(RegistryError),

    #[error("Registry error: {0}")]
    Registry(RegistryError),
}

impl ConnectionError {
    fn websocket<E: std::fmt::Display>(err: E) -> Self {
        Self::WebSocket(err.to_string())
    }
}
