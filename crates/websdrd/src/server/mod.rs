//! WebSocket server for the WebSDR daemon.
//!
//! The server:
//! - Listens on a TCP socket and upgrades each client to WebSocket
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken, waiting for every
//!   connection to release its session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    SdrServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept() + WebSocket handshake
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │◀────│                 │
//! └─────────────────┘     └─────────────────┘
//!                 writable signal
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, MAX_MESSAGE_SIZE};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::registry::RegistryHandle;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8073";

/// WebSocket handshake timeout (10 seconds)
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket server for the WebSDR daemon.
pub struct SdrServer {
    /// Bound listener
    listener: TcpListener,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,

    /// Live connection tasks
    connections: TaskTracker,
}

impl SdrServer {
    /// Binds the listen socket.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            connections: TaskTracker::new(),
        })
    }

    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every connection task to finish.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr()?, "WebSDR server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        self.connections.close();
        self.connections.wait().await;
        info!("Server cleanup complete");
        Ok(())
    }

    /// Upgrades a TCP connection and spawns its handler task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        let registry = self.registry.clone();
        let cancel_token = self.cancel_token.clone();

        self.connections.spawn(async move {
            debug!(connection = connection_number, peer = %peer, "Accepted TCP connection");

            let handshake = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream));
            let ws = tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!(peer = %peer, "Shutdown during WebSocket handshake");
                    return;
                }
                result = handshake => match result {
                    Ok(Ok(ws)) => ws,
                    Ok(Err(e)) => {
                        warn!(peer = %peer, error = %e, "WebSocket handshake failed");
                        return;
                    }
                    Err(_) => {
                        warn!(peer = %peer, "WebSocket handshake timed out");
                        return;
                    }
                },
            };

            let handler = ConnectionHandler::new(ws, peer, registry, cancel_token);
            if let Err(e) = handler.run().await {
                debug!(connection = connection_number, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_addr_parses() {
        assert!(DEFAULT_LISTEN_ADDR.parse::<SocketAddr>().is_ok());
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:8073".parse().unwrap(),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:8073"));
        assert!(err.to_string().contains("address in use"));
    }
}
