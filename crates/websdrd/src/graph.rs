//! Guard around the shared processing graph.
//!
//! The flow graph executes on its own context and must not be rewired while
//! it runs. Every structural mutation (attach, detach, demod swap, source
//! swap) therefore needs a [`StructuralLock`], obtained from
//! [`GraphGuard::lock`]. The lock pauses graph execution for its lifetime and
//! resumes it on drop, on every exit path. Receiver and engine operations
//! that rewire the graph take `&StructuralLock` as an argument, so a
//! structural mutation without the guard does not compile.
//!
//! # State machine
//!
//! ```text
//!            lock()/drop (attach, detach, swaps)
//!              ┌───────────┐
//!              ▼           │
//!        ┌─────────┐ ──────┘      stop_and_wait()       ┌─────────┐
//!        │ RUNNING │ ──────────────────────────────────▶│ STOPPED │
//!        └─────────┘ ◀──────────────────────────────────└─────────┘
//!                      lock dropped with ≥1 receiver attached
//! ```
//!
//! The graph starts STOPPED; the first attach starts it. `stop_and_wait` is
//! used only when the last running receiver is about to be removed, and is
//! the one blocking call in the control plane.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

/// Runtime interface of the shared processing graph.
///
/// All methods are synchronous. `stop` followed by `wait` must return only
/// once the graph has ceased execution.
pub trait FlowGraph: Send + Sync {
    /// Pauses execution so the topology can be changed.
    fn lock(&self);

    /// Resumes execution after a topology change.
    fn unlock(&self);

    /// Starts execution.
    fn start(&self);

    /// Requests execution to stop.
    fn stop(&self);

    /// Blocks until execution has stopped.
    fn wait(&self);
}

/// Operating state of the shared graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Running,
    Stopped,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Owner of the shared graph handle and its operating state.
pub struct GraphGuard {
    graph: Arc<dyn FlowGraph>,
    state: GraphState,
    running_receivers: usize,
}

impl GraphGuard {
    /// Wraps a graph that has not been started yet.
    pub fn new(graph: Arc<dyn FlowGraph>) -> Self {
        Self {
            graph,
            state: GraphState::Stopped,
            running_receivers: 0,
        }
    }

    /// Acquires the structural-mutation lock.
    pub fn lock(&mut self) -> StructuralLock<'_> {
        self.graph.lock();
        StructuralLock { guard: self }
    }

    /// Stops the graph and blocks until it has ceased execution.
    pub fn stop_and_wait(&mut self) {
        info!(
            running_receivers = self.running_receivers,
            "Stopping shared flow graph"
        );
        self.graph.stop();
        self.graph.wait();
        self.state = GraphState::Stopped;
        debug!("Shared flow graph stopped");
    }

    /// Current operating state.
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Number of receivers attached and consuming from the graph.
    pub fn running_receivers(&self) -> usize {
        self.running_receivers
    }
}

impl fmt::Debug for GraphGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphGuard")
            .field("state", &self.state)
            .field("running_receivers", &self.running_receivers)
            .finish()
    }
}

/// Scoped proof that the graph is locked for a structural change.
///
/// Releasing the lock restarts a stopped graph once at least one receiver
/// is attached again.
pub struct StructuralLock<'a> {
    guard: &'a mut GraphGuard,
}

impl StructuralLock<'_> {
    /// Records that a receiver started consuming from the graph.
    pub(crate) fn note_attached(&mut self) {
        self.guard.running_receivers += 1;
    }

    /// Records that a receiver stopped consuming from the graph.
    pub(crate) fn note_detached(&mut self) {
        self.guard.running_receivers = self.guard.running_receivers.saturating_sub(1);
    }

    /// Number of running receivers as seen inside the lock.
    pub fn running_receivers(&self) -> usize {
        self.guard.running_receivers
    }
}

impl Drop for StructuralLock<'_> {
    fn drop(&mut self) {
        self.guard.graph.unlock();
        if self.guard.state == GraphState::Stopped && self.guard.running_receivers > 0 {
            self.guard.graph.start();
            self.guard.state = GraphState::Running;
            info!(
                running_receivers = self.guard.running_receivers,
                "Shared flow graph started"
            );
        }
    }
}
