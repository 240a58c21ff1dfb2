//! Session registry state machine.
//!
//! `SessionRegistry` owns every session, the graph guard and the backend
//! handles. It is driven by the actor one command at a time and is plain
//! synchronous code, so it can be unit tested without a runtime.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Unknown session ids are reported as `RegistryError::SessionNotFound`
//!   or ignored, never indexed

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use websdr_core::{Demod, SessionId, StreamIdGenerator};
use websdr_protocol::{ClientCommand, StateUpdate};

use super::commands::{RegistryError, RegistryStats};
use super::session::{Session, WritableSignal};
use crate::auth::Authenticator;
use crate::dispatch::{self, DispatchContext};
use crate::encoder;
use crate::engine::EngineFactory;
use crate::graph::{FlowGraph, GraphGuard};
use crate::hardware::SourceTable;
use crate::receiver::Receiver;

// ============================================================================
// Resource Limits
// ============================================================================

/// Default maximum number of concurrent sessions.
pub const MAX_SESSIONS: usize = 100;

// ============================================================================
// Backend
// ============================================================================

/// External collaborators the registry drives.
#[derive(Clone)]
pub struct Backend {
    pub graph: Arc<dyn FlowGraph>,
    pub sources: SourceTable,
    pub engines: Arc<dyn EngineFactory>,
    pub auth: Arc<dyn Authenticator>,
}

// ============================================================================
// Session Registry
// ============================================================================

/// Owner of all live sessions and the shared graph guard.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    ids: StreamIdGenerator,
    graph: GraphGuard,
    sources: SourceTable,
    engines: Arc<dyn EngineFactory>,
    auth: Arc<dyn Authenticator>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(backend: Backend, max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            ids: StreamIdGenerator::new(),
            graph: GraphGuard::new(backend.graph),
            sources: backend.sources,
            engines: backend.engines,
            auth: backend.auth,
            max_sessions,
        }
    }

    #[cfg(test)]
    fn with_id_generator(mut self, ids: StreamIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Registers a new connection and attaches its receiver.
    ///
    /// The receiver starts on the first source, if any, with the default
    /// demodulator. Every session is made writable afterwards so clients
    /// see the new count.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if at capacity
    /// - `RegistryError::IdOverflow` if no further id fits the name length
    /// - `RegistryError::Engine` if the receiver could not be built or attached
    pub fn create(&mut self, writable: WritableSignal) -> Result<SessionId, RegistryError> {
        if self.sessions.len() >= self.max_sessions {
            warn!(max = self.max_sessions, "Registry full, rejecting connection");
            return Err(RegistryError::RegistryFull {
                max: self.max_sessions,
            });
        }

        let id = self.ids.next_id().map_err(RegistryError::IdOverflow)?;
        let demod = Demod::default();
        let engine = self.engines.build(&id, demod)?;
        let mut receiver = Receiver::new(engine, demod, self.sources.descriptor(0));

        {
            let mut lock = self.graph.lock();
            receiver.start(&mut lock)?;
        }

        let session = Session::new(id.clone(), receiver, writable);
        self.sessions.insert(id.clone(), session);

        info!(
            session_id = %id,
            num_clients = self.sessions.len(),
            graph = %self.graph.state(),
            "Session created"
        );

        self.request_writable_all();
        Ok(id)
    }

    /// Tears down a session. Returns false if it was not registered.
    ///
    /// Removing the last running receiver stops the graph and waits for it
    /// before detaching; otherwise the receiver is detached under the lock
    /// while the graph keeps running.
    pub fn destroy(&mut self, id: &SessionId) -> bool {
        let Some(mut session) = self.sessions.remove(id) else {
            debug!(session_id = %id, "Close for unknown session ignored");
            return false;
        };

        if session.receiver.is_running() {
            if self.graph.running_receivers() == 1 {
                self.graph.stop_and_wait();
            }
            let mut lock = self.graph.lock();
            if let Err(e) = session.receiver.stop(&mut lock) {
                warn!(session_id = %id, error = %e, "Receiver detach failed");
            }
        }

        info!(
            session_id = %id,
            connected_secs = session.age_secs(),
            num_clients = self.sessions.len(),
            graph = %self.graph.state(),
            "Session destroyed"
        );

        self.request_writable_all();
        true
    }

    /// Looks up a live session.
    pub fn lookup(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Applies one inbound frame to a session.
    ///
    /// Frames that do not decode are logged and dropped. Otherwise the
    /// session is made writable, and every session is if hardware changed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    pub fn handle_message(&mut self, id: &SessionId, payload: &[u8]) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.clone()))?;

        let command = match ClientCommand::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Discarding undecodable message");
                return Ok(());
            }
        };

        if command.is_empty() {
            debug!(session_id = %id, "Message carried no recognised keys");
        } else if command.touches_hardware() {
            debug!(session_id = %id, "Message requests a hardware change");
        }

        let ctx = DispatchContext {
            graph: &mut self.graph,
            sources: &self.sources,
            auth: self.auth.as_ref(),
        };
        let outcome = dispatch::apply(&command, session, ctx);
        session.writable.request();

        if outcome.hardware_changed {
            debug!(session_id = %id, "Hardware changed, refreshing all sessions");
            self.request_writable_all();
        }
        Ok(())
    }

    /// Composes the next state update for a session.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    pub fn compose_update(&mut self, id: &SessionId) -> Result<StateUpdate, RegistryError> {
        let num_clients = self.sessions.len();
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.clone()))?;
        let update = encoder::compose(session, &self.sources, num_clients);
        if update.is_init() {
            debug!(session_id = %id, "Composed init bundle");
        }
        Ok(update)
    }

    /// Number of live sessions.
    pub fn num_clients(&self) -> usize {
        self.sessions.len()
    }

    /// Makes every session writable.
    pub fn request_writable_all(&self) {
        for session in self.sessions.values() {
            session.writable.request();
        }
    }

    /// Current counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            num_clients: self.sessions.len(),
            running_receivers: self.graph.running_receivers(),
            graph_state: self.graph.state(),
        }
    }
}
