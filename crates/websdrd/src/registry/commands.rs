//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryStats`: Snapshot returned by `RegistryCommand::Stats`

use thiserror::Error;
use tokio::sync::oneshot;

use websdr_core::{DomainError, SessionId};

use super::session::WritableSignal;
use crate::engine::EngineError;
use crate::graph::GraphState;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response, except the
/// fire-and-forget `Heartbeat`. The actor handles them one at a time, so
/// no two sessions are ever mutated concurrently.
#[derive(Debug)]
pub enum RegistryCommand {
    /// A client connected.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::IdOverflow` if the id space is exhausted
    /// - `RegistryError::Engine` if the receiver could not be built
    Connect {
        /// Signal used to wake the connection for writes
        writable: WritableSignal,
        respond_to: oneshot::Sender<Result<SessionId, RegistryError>>,
    },

    /// A text frame arrived from a client.
    ///
    /// Malformed payloads are logged and dropped; they are not errors.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    Message {
        session_id: SessionId,
        payload: Vec<u8>,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// The connection can send; compose the next state update.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    /// - `RegistryError::Encode` if serialization fails
    Writable {
        session_id: SessionId,
        /// Serialized `StateUpdate`
        respond_to: oneshot::Sender<Result<String, RegistryError>>,
    },

    /// The connection closed. Responds `false` for unknown sessions.
    Close {
        session_id: SessionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Periodic refresh: makes every session writable.
    Heartbeat,

    /// Snapshot of registry counters.
    Stats {
        respond_to: oneshot::Sender<RegistryStats>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The registry has reached its maximum session capacity.
    #[error("registry is full (max: {max} sessions)")]
    RegistryFull {
        /// Maximum number of sessions allowed
        max: usize,
    },

    /// No further stream id fits the stream name length.
    #[error("cannot allocate session id: {0}")]
    IdOverflow(DomainError),

    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The receiver engine failed during connect.
    #[error("receiver engine error: {0}")]
    Engine(#[from] EngineError),

    /// The state update could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

impl RegistryError {
    /// Creates an encode error from any error type.
    pub fn encode<E: std::fmt::Display>(err: E) -> Self {
        Self::Encode(err.to_string())
    }
}

// ============================================================================
// Registry Stats
// ============================================================================

/// Point-in-time view of the registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub num_clients: usize,
    pub running_receivers: usize,
    pub graph_state: GraphState,
}
