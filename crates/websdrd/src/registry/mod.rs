//! Session registry using the Actor pattern.
//!
//! The registry is the single owner of every session, receiver and the
//! shared graph guard. Connection tasks talk to it through a
//! [`RegistryHandle`]; the actor applies their commands one at a time on a
//! dedicated thread, so session state needs no locking.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  RegistryCommand   ┌─────────────────┐
//! │ Connection task │───────────────────▶│  RegistryActor  │ (own thread)
//! │  (one per ws)   │◀───────────────────│                 │
//! └─────────────────┘  oneshot reply     └────────┬────────┘
//!         ▲                                       │
//!         │ WritableSignal::request()             ▼
//!         └──────────────────────────────  SessionRegistry
//!                                          ├─ HashMap<SessionId, Session>
//!                                          ├─ GraphGuard ──▶ FlowGraph
//!                                          └─ SourceTable ─▶ HardwareSource
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::io;
use std::thread;

use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

mod actor;
mod commands;
mod handle;
mod session;
mod state;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, RegistryStats};
pub use handle::RegistryHandle;
pub use session::{DirtyFlags, Session, WritableSignal};
pub use state::{Backend, SessionRegistry, MAX_SESSIONS};

/// Channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// Tuning for [`spawn_registry`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Period of the all-sessions refresh, `None` to disable
    pub heartbeat: Option<Duration>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            max_sessions: MAX_SESSIONS,
            heartbeat: Some(Duration::from_secs(DEFAULT_HEARTBEAT_SECS)),
        }
    }
}

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Starts the RegistryActor on its own thread
/// 3. Spawns the heartbeat task, if enabled
/// 4. Returns a RegistryHandle for connection tasks
///
/// The actor exits once every handle has been dropped. Must be called from
/// within a tokio runtime when a heartbeat is configured.
///
/// # Errors
///
/// Returns an error if the actor thread cannot be spawned.
pub fn spawn_registry(backend: Backend, options: RegistryOptions) -> io::Result<RegistryHandle> {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, SessionRegistry::new(backend, options.max_sessions));
    thread::Builder::new()
        .name("websdr-registry".to_string())
        .spawn(move || actor.run_blocking())?;

    if let Some(period) = options.heartbeat {
        spawn_heartbeat_task(cmd_tx.downgrade(), period);
    }

    Ok(RegistryHandle::new(cmd_tx))
}

/// Spawn a background task that periodically makes every session writable.
///
/// Clients see hardware values change even when no command caused them.
/// Holds only a weak sender so the actor still exits once the last handle
/// is dropped.
fn spawn_heartbeat_task(sender: mpsc::WeakSender<RegistryCommand>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Heartbeat task stopping: registry handles dropped");
                break;
            };

            // Fire-and-forget heartbeat command
            if sender.send(RegistryCommand::Heartbeat).await.is_err() {
                debug!("Heartbeat task stopping: registry channel closed");
                break;
            }
        }
    });
}
