//! In-process backend for running without DSP hardware.
//!
//! Provides [`FlowGraph`], [`HardwareSource`] and [`EngineFactory`]
//! implementations that honour the control-plane contracts without moving
//! any samples. The flow graph records every transition so tests can check
//! the lock/stop discipline; sources keep their parameters in memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};
use websdr_core::{Demod, SessionId};

use crate::engine::{EngineError, EngineFactory, ReceiverEngine};
use crate::graph::{FlowGraph, StructuralLock};
use crate::hardware::{HardwareError, HardwareSource};

// ============================================================================
// Flow Graph
// ============================================================================

/// A transition observed by [`LoopbackFlowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    Lock,
    Unlock,
    Start,
    Stop,
    Wait,
}

#[derive(Debug, Default)]
struct GraphInner {
    running: bool,
    lock_depth: usize,
    events: Vec<GraphEvent>,
}

/// Flow graph that executes nothing and records its transitions.
#[derive(Debug, Default)]
pub struct LoopbackFlowGraph {
    inner: Mutex<GraphInner>,
    stopped: Condvar,
}

impl LoopbackFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// All transitions so far, oldest first.
    pub fn events(&self) -> Vec<GraphEvent> {
        self.inner.lock().events.clone()
    }

    /// Forgets recorded transitions.
    pub fn clear_events(&self) {
        self.inner.lock().events.clear();
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: GraphEvent) -> usize {
        self.inner.lock().events.iter().filter(|e| **e == event).count()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().lock_depth > 0
    }
}

impl FlowGraph for LoopbackFlowGraph {
    fn lock(&self) {
        let mut inner = self.inner.lock();
        inner.lock_depth += 1;
        inner.events.push(GraphEvent::Lock);
    }

    fn unlock(&self) {
        let mut inner = self.inner.lock();
        inner.lock_depth = inner.lock_depth.saturating_sub(1);
        inner.events.push(GraphEvent::Unlock);
    }

    fn start(&self) {
        let mut inner = self.inner.lock();
        inner.running = true;
        inner.events.push(GraphEvent::Start);
        debug!("Loopback graph started");
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.running = false;
        inner.events.push(GraphEvent::Stop);
        self.stopped.notify_all();
    }

    fn wait(&self) {
        let mut inner = self.inner.lock();
        while inner.running {
            self.stopped.wait(&mut inner);
        }
        inner.events.push(GraphEvent::Wait);
        debug!("Loopback graph stopped");
    }
}

// ============================================================================
// Hardware Source
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct SourceRegisters {
    center_freq: i64,
    gain: f64,
    auto_gain: bool,
    sample_rate: u32,
}

/// Hardware source whose registers live in memory.
#[derive(Debug)]
pub struct LoopbackSource {
    registers: Mutex<SourceRegisters>,
}

impl LoopbackSource {
    /// Creates a source in manual gain mode with 0 dB gain.
    pub fn new(center_freq: i64, sample_rate: u32) -> Self {
        Self {
            registers: Mutex::new(SourceRegisters {
                center_freq,
                gain: 0.0,
                auto_gain: false,
                sample_rate,
            }),
        }
    }

    /// Sets the initial gain state.
    #[must_use]
    pub fn with_gain(self, gain: f64, auto_gain: bool) -> Self {
        {
            let mut regs = self.registers.lock();
            regs.gain = gain;
            regs.auto_gain = auto_gain;
        }
        self
    }
}

impl HardwareSource for LoopbackSource {
    fn center_freq(&self) -> i64 {
        self.registers.lock().center_freq
    }

    fn set_center_freq(&self, freq: i64) -> Result<(), HardwareError> {
        if freq <= 0 {
            return Err(HardwareError::Rejected {
                param: "center_freq",
                value: freq.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        self.registers.lock().center_freq = freq;
        Ok(())
    }

    fn gain(&self) -> f64 {
        self.registers.lock().gain
    }

    fn set_gain(&self, gain: f64) -> Result<(), HardwareError> {
        if !gain.is_finite() {
            return Err(HardwareError::Rejected {
                param: "gain",
                value: gain.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        self.registers.lock().gain = gain;
        Ok(())
    }

    fn gain_mode(&self) -> bool {
        self.registers.lock().auto_gain
    }

    fn set_gain_mode(&self, automatic: bool) -> Result<(), HardwareError> {
        self.registers.lock().auto_gain = automatic;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.registers.lock().sample_rate
    }
}

// ============================================================================
// Receiver Engine
// ============================================================================

/// Engine that only tracks how it is wired.
#[derive(Debug)]
pub struct LoopbackEngine {
    stream: String,
    attached: bool,
    demod: Demod,
    source: Option<usize>,
    freq_offset: i64,
    live: Arc<AtomicUsize>,
}

impl ReceiverEngine for LoopbackEngine {
    fn attach(
        &mut self,
        _graph: &StructuralLock<'_>,
        source: Option<usize>,
    ) -> Result<(), EngineError> {
        if !self.attached {
            self.live.fetch_add(1, Ordering::Relaxed);
        }
        self.attached = true;
        self.source = source;
        trace!(stream = %self.stream, ?source, "Loopback engine attached");
        Ok(())
    }

    fn detach(&mut self, _graph: &StructuralLock<'_>) -> Result<(), EngineError> {
        if self.attached {
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
        self.attached = false;
        trace!(stream = %self.stream, "Loopback engine detached");
        Ok(())
    }

    fn set_demod(&mut self, _graph: &StructuralLock<'_>, demod: Demod) -> Result<(), EngineError> {
        let params = demod.params();
        trace!(
            stream = %self.stream,
            from = %self.demod,
            to = %demod,
            channel_width = params.channel_width,
            "Loopback engine demod swapped"
        );
        self.demod = demod;
        Ok(())
    }

    fn set_source(
        &mut self,
        _graph: &StructuralLock<'_>,
        source: usize,
    ) -> Result<(), EngineError> {
        trace!(
            stream = %self.stream,
            from = ?self.source,
            to = source,
            "Loopback engine source swapped"
        );
        self.source = Some(source);
        Ok(())
    }

    fn set_freq_offset(&mut self, offset: i64) {
        trace!(
            stream = %self.stream,
            from = self.freq_offset,
            to = offset,
            "Loopback engine retuned"
        );
        self.freq_offset = offset;
    }
}

/// Builds [`LoopbackEngine`]s and counts how many are attached.
#[derive(Debug, Default)]
pub struct LoopbackEngineFactory {
    live: Arc<AtomicUsize>,
    refuse_builds: bool,
}

impl LoopbackEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose builds always fail.
    pub fn refusing() -> Self {
        Self {
            refuse_builds: true,
            ..Self::default()
        }
    }

    /// Number of engines currently attached to the graph.
    pub fn attached(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl EngineFactory for LoopbackEngineFactory {
    fn build(
        &self,
        session: &SessionId,
        demod: Demod,
    ) -> Result<Box<dyn ReceiverEngine>, EngineError> {
        if self.refuse_builds {
            return Err(EngineError::Build("loopback factory refuses builds".to_string()));
        }
        Ok(Box::new(LoopbackEngine {
            stream: session.stream_name(),
            attached: false,
            demod,
            source: None,
            freq_offset: 0,
            live: Arc::clone(&self.live),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_rejects_bad_values() {
        let src = LoopbackSource::new(7_000_000, 1_024_000);
        assert!(src.set_center_freq(-1).is_err());
        assert!(src.set_gain(f64::NAN).is_err());
        assert_eq!(src.center_freq(), 7_000_000);
        src.set_center_freq(7_100_000).unwrap();
        assert_eq!(src.center_freq(), 7_100_000);
    }

    #[test]
    fn test_stop_then_wait_returns() {
        let graph = LoopbackFlowGraph::new();
        graph.start();
        graph.stop();
        graph.wait();
        assert!(!graph.is_running());
        assert_eq!(
            graph.events(),
            vec![GraphEvent::Start, GraphEvent::Stop, GraphEvent::Wait]
        );
    }

    #[test]
    fn test_refusing_factory() {
        let factory = LoopbackEngineFactory::refusing();
        assert!(factory.build(&SessionId::new("0000"), Demod::Am).is_err());
    }
}
