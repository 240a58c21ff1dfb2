//! Outbound state updates.

use serde::{Deserialize, Serialize};
use websdr_core::Demod;

/// Full description of the source a receiver is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSource {
    pub source_ix: usize,
    pub description: String,
    pub hw_freq: i64,
    pub sample_rate: u32,
    pub converter_offset: i64,
    pub auto_gain: bool,
    pub gain: f64,
}

/// One message sent to a client on a writable turn.
///
/// Absent fields are omitted from the JSON; `num_clients` is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Stream label, sent once in the init bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,

    /// Labels of all hardware sources, init bundle only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,

    /// Names of all demodulators, init bundle only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_demods: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_freq: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_gain: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demod: Option<Demod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq_offset: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_source: Option<CurrentSource>,

    /// Number of live sessions when the message was composed
    pub num_clients: usize,
}

impl StateUpdate {
    /// Creates an update carrying only the client count.
    pub fn new(num_clients: usize) -> Self {
        Self {
            num_clients,
            ..Self::default()
        }
    }

    /// Returns true if this update carries the init bundle.
    pub fn is_init(&self) -> bool {
        self.stream_name.is_some()
    }

    /// Serializes to a single-line JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
