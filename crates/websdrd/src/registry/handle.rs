//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` is the four-call transport contract
//! (`on_connect`, `on_message`, `on_writable`, `on_close`) plus a stats
//! query. It is cheap to clone and shared by every connection task.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use websdr_core::SessionId;

use super::commands::{RegistryCommand, RegistryError, RegistryStats};
use super::session::WritableSignal;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// let writable = WritableSignal::new();
/// let id = handle.on_connect(writable.clone()).await?;
/// handle.on_message(id.clone(), br#"{"demod":"AM"}"#.to_vec()).await?;
/// writable.requested().await;
/// let json = handle.on_writable(id.clone()).await?;
/// handle.on_close(id).await;
/// ```
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Registers a new connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the registry is at capacity
    /// - `RegistryError::IdOverflow` if the id space is exhausted
    /// - `RegistryError::Engine` if the receiver could not be attached
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn on_connect(&self, writable: WritableSignal) -> Result<SessionId, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Connect {
                writable,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Delivers one inbound frame.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn on_message(
        &self,
        session_id: SessionId,
        payload: Vec<u8>,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Message {
                session_id,
                payload,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Composes the next update for a session as a JSON string.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    /// - `RegistryError::Encode` if serialization fails
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn on_writable(&self, session_id: SessionId) -> Result<String, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Writable {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Tears down a session.
    ///
    /// Returns `false` if the session was unknown or the actor is gone.
    pub async fn on_close(&self, session_id: SessionId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Close {
                session_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Makes every session writable.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn heartbeat(&self) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::Heartbeat)
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Snapshot of the registry counters, or `None` if the actor is gone.
    pub async fn stats(&self) -> Option<RegistryStats> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Stats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Returns true while the actor is accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
