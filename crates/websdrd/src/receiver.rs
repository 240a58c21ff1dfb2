//! Per-session receiver state.

use std::fmt;

use websdr_core::{Demod, SourceDescriptor};

use crate::engine::{EngineError, ReceiverEngine};
use crate::graph::StructuralLock;

/// The logical demodulation unit owned by one session.
///
/// Holds the session-visible receiver parameters and the engine that
/// realises them in the shared graph. The hardware source is referenced by
/// index only.
pub struct Receiver {
    privileged: bool,
    freq_offset: i64,
    demod: Demod,
    source_ix: Option<usize>,
    running: bool,
    engine: Box<dyn ReceiverEngine>,
}

impl Receiver {
    /// Creates a stopped receiver tuned to `source`, if any.
    ///
    /// The initial frequency offset is the source's default offset.
    pub fn new(
        engine: Box<dyn ReceiverEngine>,
        demod: Demod,
        source: Option<&SourceDescriptor>,
    ) -> Self {
        Self {
            privileged: false,
            freq_offset: source.map(|s| s.default_offset).unwrap_or(0),
            demod,
            source_ix: source.map(|s| s.index),
            running: false,
            engine,
        }
    }

    // ------------------------------------------------------------------------
    // Structural operations (require the graph lock)
    // ------------------------------------------------------------------------

    /// Attaches the engine to the graph. No-op if already running.
    pub fn start(&mut self, lock: &mut StructuralLock<'_>) -> Result<(), EngineError> {
        if self.running {
            return Ok(());
        }
        self.engine.attach(lock, self.source_ix)?;
        self.engine.set_freq_offset(self.freq_offset);
        self.running = true;
        lock.note_attached();
        Ok(())
    }

    /// Detaches the engine from the graph. No-op if not running.
    ///
    /// The receiver counts as stopped afterwards even if the engine reports
    /// an error, since the session is going away.
    pub fn stop(&mut self, lock: &mut StructuralLock<'_>) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        let result = self.engine.detach(lock);
        self.running = false;
        lock.note_detached();
        result
    }

    /// Swaps the demodulator.
    pub fn change_demod(
        &mut self,
        lock: &StructuralLock<'_>,
        demod: Demod,
    ) -> Result<(), EngineError> {
        self.engine.set_demod(lock, demod)?;
        self.demod = demod;
        Ok(())
    }

    /// Moves to another source and resets the offset to its default.
    pub fn set_source(
        &mut self,
        lock: &StructuralLock<'_>,
        source: &SourceDescriptor,
    ) -> Result<(), EngineError> {
        self.engine.set_source(lock, source.index)?;
        self.source_ix = Some(source.index);
        self.set_freq_offset(source.default_offset);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Parameter operations
    // ------------------------------------------------------------------------

    /// Retunes within the source bandwidth.
    pub fn set_freq_offset(&mut self, offset: i64) {
        self.engine.set_freq_offset(offset);
        self.freq_offset = offset;
    }

    pub fn set_privileged(&mut self, privileged: bool) {
        self.privileged = privileged;
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn freq_offset(&self) -> i64 {
        self.freq_offset
    }

    pub fn demod(&self) -> Demod {
        self.demod
    }

    pub fn source_ix(&self) -> Option<usize> {
        self.source_ix
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("privileged", &self.privileged)
            .field("freq_offset", &self.freq_offset)
            .field("demod", &self.demod)
            .field("source_ix", &self.source_ix)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use websdr_core::SessionId;

    use crate::engine::EngineFactory;
    use crate::graph::GraphGuard;
    use crate::loopback::{LoopbackEngineFactory, LoopbackFlowGraph};

    fn receiver(source: Option<&SourceDescriptor>) -> Receiver {
        let engine = LoopbackEngineFactory::new()
            .build(&SessionId::new("0000"), Demod::Fm)
            .unwrap();
        Receiver::new(engine, Demod::Fm, source)
    }

    #[test]
    fn test_initial_offset_from_descriptor() {
        let desc = SourceDescriptor::new(0, "a", "A").with_default_offset(-2_500);
        let rx = receiver(Some(&desc));
        assert_eq!(rx.freq_offset(), -2_500);
        assert_eq!(rx.source_ix(), Some(0));
        assert!(!rx.privileged());
        assert!(!rx.is_running());

        let rx = receiver(None);
        assert_eq!(rx.freq_offset(), 0);
        assert_eq!(rx.source_ix(), None);
    }

    #[test]
    fn test_start_stop_are_idempotent() {
        let mut guard = GraphGuard::new(Arc::new(LoopbackFlowGraph::new()));
        let mut rx = receiver(None);

        {
            let mut lock = guard.lock();
            rx.start(&mut lock).unwrap();
            rx.start(&mut lock).unwrap();
        }
        assert!(rx.is_running());
        assert_eq!(guard.running_receivers(), 1);

        {
            let mut lock = guard.lock();
            rx.stop(&mut lock).unwrap();
            rx.stop(&mut lock).unwrap();
        }
        assert!(!rx.is_running());
        assert_eq!(guard.running_receivers(), 0);
    }

    #[test]
    fn test_set_source_resets_offset() {
        let mut guard = GraphGuard::new(Arc::new(LoopbackFlowGraph::new()));
        let a = SourceDescriptor::new(0, "a", "A");
        let b = SourceDescriptor::new(1, "b", "B").with_default_offset(10_000);
        let mut rx = receiver(Some(&a));
        rx.set_freq_offset(777);

        let lock = guard.lock();
        rx.set_source(&lock, &b).unwrap();
        drop(lock);

        assert_eq!(rx.source_ix(), Some(1));
        assert_eq!(rx.freq_offset(), 10_000);
    }

    #[test]
    fn test_change_demod() {
        let mut guard = GraphGuard::new(Arc::new(LoopbackFlowGraph::new()));
        let mut rx = receiver(None);
        let lock = guard.lock();
        rx.change_demod(&lock, Demod::Usb).unwrap();
        drop(lock);
        assert_eq!(rx.demod(), Demod::Usb);
    }
}
