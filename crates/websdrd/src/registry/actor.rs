//! Registry actor - owns the session registry and processes commands.
//!
//! The actor runs on a dedicated OS thread rather than a tokio task: tearing
//! down the last receiver blocks on the flow graph's stop/wait, and that must
//! not stall a runtime worker.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures mean the caller went away and are ignored, except
//!   for `Connect`, where the new session is torn down again

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::commands::{RegistryCommand, RegistryError};
use super::state::SessionRegistry;

/// The registry actor.
///
/// Receives commands via an mpsc channel and applies them to the
/// [`SessionRegistry`] strictly one at a time.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    registry: SessionRegistry,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, registry: SessionRegistry) -> Self {
        Self { receiver, registry }
    }

    /// Processes commands until every handle has been dropped.
    ///
    /// Blocks the calling thread; must not be called from async context.
    pub fn run_blocking(mut self) {
        info!("Registry actor started");

        while let Some(cmd) = self.receiver.blocking_recv() {
            self.handle_command(cmd);
        }

        info!(
            remaining_sessions = self.registry.num_clients(),
            "Registry actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Connect {
                writable,
                respond_to,
            } => {
                let result = self.registry.create(writable);
                if respond_to.send(result.clone()).is_err() {
                    // Connection gave up while we were attaching; undo.
                    if let Ok(id) = result {
                        debug!(session_id = %id, "Connect caller gone, destroying session");
                        self.registry.destroy(&id);
                    }
                }
            }

            RegistryCommand::Message {
                session_id,
                payload,
                respond_to,
            } => {
                let result = self.registry.handle_message(&session_id, &payload);
                let _ = respond_to.send(result);
            }

            RegistryCommand::Writable {
                session_id,
                respond_to,
            } => {
                let result = self
                    .registry
                    .compose_update(&session_id)
                    .and_then(|update| update.to_json().map_err(RegistryError::encode));
                let _ = respond_to.send(result);
            }

            RegistryCommand::Close {
                session_id,
                respond_to,
            } => {
                let removed = self.registry.destroy(&session_id);
                let _ = respond_to.send(removed);
            }

            RegistryCommand::Heartbeat => {
                self.registry.request_writable_all();
            }

            RegistryCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.registry.stats());
            }
        }
    }
}
