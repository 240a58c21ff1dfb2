//! Hardware source descriptors.

use serde::{Deserialize, Serialize};

/// Immutable description of one hardware source in the source table.
///
/// Built once at startup; the table never grows or shrinks afterwards, so
/// `index` stays valid for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Position in the source table.
    pub index: usize,
    /// Short label shown in the client's source selector.
    pub label: String,
    /// Human readable description.
    pub description: String,
    /// Frequency-converter offset in Hz (0 without an up/down converter).
    pub converter_offset: i64,
    /// Receiver frequency offset in Hz applied when this source is attached.
    #[serde(default)]
    pub default_offset: i64,
}

impl SourceDescriptor {
    /// Creates a descriptor with no converter and a zero default offset.
    pub fn new(index: usize, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
            description: description.into(),
            converter_offset: 0,
            default_offset: 0,
        }
    }

    /// Sets the frequency-converter offset.
    #[must_use]
    pub fn with_converter_offset(mut self, offset: i64) -> Self {
        self.converter_offset = offset;
        self
    }

    /// Sets the default receiver offset.
    #[must_use]
    pub fn with_default_offset(mut self, offset: i64) -> Self {
        self.default_offset = offset;
        self
    }
}
