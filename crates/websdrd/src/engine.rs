//! Seam to the external receiver engine (demodulator chain and audio encoder).
//!
//! The control plane never touches DSP blocks directly. It builds one engine
//! per session through an [`EngineFactory`] and drives it through
//! [`ReceiverEngine`]. Rewiring calls require a [`StructuralLock`].

use thiserror::Error;
use websdr_core::{Demod, SessionId};

use crate::graph::StructuralLock;

/// Per-session demodulator chain attached to the shared flow graph.
pub trait ReceiverEngine: Send {
    /// Connects the chain to the graph, fed by `source` if any.
    fn attach(
        &mut self,
        graph: &StructuralLock<'_>,
        source: Option<usize>,
    ) -> Result<(), EngineError>;

    /// Disconnects the chain from the graph.
    fn detach(&mut self, graph: &StructuralLock<'_>) -> Result<(), EngineError>;

    /// Replaces the demodulator block.
    fn set_demod(&mut self, graph: &StructuralLock<'_>, demod: Demod) -> Result<(), EngineError>;

    /// Moves the chain to another hardware source.
    fn set_source(&mut self, graph: &StructuralLock<'_>, source: usize) -> Result<(), EngineError>;

    /// Retunes the channel within the source bandwidth. Parameter write only.
    fn set_freq_offset(&mut self, offset: i64);
}

/// Builds engines for new sessions.
pub trait EngineFactory: Send + Sync {
    /// Creates a detached engine whose audio output is named after `session`.
    fn build(
        &self,
        session: &SessionId,
        demod: Demod,
    ) -> Result<Box<dyn ReceiverEngine>, EngineError>;
}

/// Errors reported by the receiver engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to build receiver chain: {0}")]
    Build(String),
}
