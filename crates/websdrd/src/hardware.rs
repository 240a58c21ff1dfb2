//! Hardware source table.
//!
//! The table is built once at startup and is read-mostly afterwards. Each
//! entry pairs an immutable [`SourceDescriptor`] with a live driver handle.
//! Receivers never own a driver: they hold a plain index into this table.
//!
//! Parameter writes (`set_center_freq`, `set_gain`, `set_gain_mode`) go
//! straight to the driver without the structural-mutation guard. Two
//! sessions writing the same source race with last-write-wins semantics.

use std::sync::Arc;

use thiserror::Error;
use websdr_core::SourceDescriptor;

/// Driver interface of one signal-acquisition device.
///
/// Implementations must tolerate calls from the registry thread while the
/// flow graph is executing.
pub trait HardwareSource: Send + Sync {
    /// Current center frequency in Hz.
    fn center_freq(&self) -> i64;

    /// Tunes the device.
    fn set_center_freq(&self, freq: i64) -> Result<(), HardwareError>;

    /// Current manual gain in dB.
    fn gain(&self) -> f64;

    /// Sets the manual gain in dB.
    fn set_gain(&self, gain: f64) -> Result<(), HardwareError>;

    /// Returns true when automatic gain control is enabled.
    fn gain_mode(&self) -> bool;

    /// Enables or disables automatic gain control.
    fn set_gain_mode(&self, automatic: bool) -> Result<(), HardwareError>;

    /// Sample rate in samples per second.
    fn sample_rate(&self) -> u32;
}

/// Point-in-time copy of a driver's live parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareSnapshot {
    pub center_freq: i64,
    pub gain: f64,
    pub auto_gain: bool,
    pub sample_rate: u32,
}

impl HardwareSnapshot {
    /// Reads all parameters from a driver.
    pub fn read(driver: &dyn HardwareSource) -> Self {
        Self {
            center_freq: driver.center_freq(),
            gain: driver.gain(),
            auto_gain: driver.gain_mode(),
            sample_rate: driver.sample_rate(),
        }
    }
}

/// One row of the source table.
#[derive(Clone)]
pub struct SourceEntry {
    pub descriptor: SourceDescriptor,
    pub driver: Arc<dyn HardwareSource>,
}

/// Fixed list of hardware sources, indexed from 0.
#[derive(Clone, Default)]
pub struct SourceTable {
    entries: Vec<SourceEntry>,
}

impl SourceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source and returns its index.
    ///
    /// The descriptor's `index` is overwritten with the assigned position.
    pub fn add(
        &mut self,
        mut descriptor: SourceDescriptor,
        driver: Arc<dyn HardwareSource>,
    ) -> usize {
        let index = self.entries.len();
        descriptor.index = index;
        self.entries.push(SourceEntry { descriptor, driver });
        index
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no source is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validates a client-supplied index.
    ///
    /// Returns the index as `usize` when `0 <= index < len()`.
    pub fn checked_index(&self, index: i64) -> Option<usize> {
        let ix = usize::try_from(index).ok()?;
        (ix < self.entries.len()).then_some(ix)
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&SourceEntry> {
        self.entries.get(index)
    }

    /// Descriptor of the source at `index`.
    pub fn descriptor(&self, index: usize) -> Option<&SourceDescriptor> {
        self.entries.get(index).map(|e| &e.descriptor)
    }

    /// Driver of the source at `index`.
    pub fn driver(&self, index: usize) -> Option<&Arc<dyn HardwareSource>> {
        self.entries.get(index).map(|e| &e.driver)
    }

    /// Labels of all sources, in table order.
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.descriptor.label.clone())
            .collect()
    }
}

impl std::fmt::Debug for SourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.descriptor))
            .finish()
    }
}

/// Errors reported by hardware drivers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HardwareError {
    #[error("{param} value {value} rejected: {reason}")]
    Rejected {
        param: &'static str,
        value: String,
        reason: String,
    },
}
