//! Demodulator kinds and their construction parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Supported demodulator kinds.
///
/// The wire name of each kind is its upper-case mnemonic ("FM", "USB", ...).
/// Names outside this set are rejected when a client command is decoded,
/// never inside the receiver engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Demod {
    /// Narrowband FM
    #[default]
    #[serde(rename = "FM")]
    Fm,
    /// Wideband (broadcast) FM
    #[serde(rename = "WFM")]
    Wfm,
    /// Amplitude modulation
    #[serde(rename = "AM")]
    Am,
    /// Upper sideband
    #[serde(rename = "USB")]
    Usb,
    /// Lower sideband
    #[serde(rename = "LSB")]
    Lsb,
}

/// Parameters the receiver engine needs to build a demodulator chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemodParams {
    /// Width of the channel filter in Hz.
    pub channel_width: u32,
    /// Audio low-pass cutoff in Hz.
    pub audio_cutoff: u32,
    /// Amplitude of the reinserted carrier for single-sideband modes.
    pub carrier_amplitude: Option<f64>,
}

impl Demod {
    /// All supported kinds, in the order advertised to clients.
    pub const ALL: [Demod; 5] = [Demod::Fm, Demod::Wfm, Demod::Am, Demod::Usb, Demod::Lsb];

    /// Wire name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fm => "FM",
            Self::Wfm => "WFM",
            Self::Am => "AM",
            Self::Usb => "USB",
            Self::Lsb => "LSB",
        }
    }

    /// Looks up a kind by its wire name. Matching is exact.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Wire names of all supported kinds, in advertised order.
    pub fn supported_names() -> Vec<String> {
        Self::ALL.iter().map(|d| d.name().to_string()).collect()
    }

    /// Construction parameters for this kind.
    pub fn params(self) -> DemodParams {
        match self {
            Self::Fm => DemodParams {
                channel_width: 12_500,
                audio_cutoff: 3_500,
                carrier_amplitude: None,
            },
            Self::Wfm => DemodParams {
                channel_width: 200_000,
                audio_cutoff: 15_000,
                carrier_amplitude: None,
            },
            Self::Am => DemodParams {
                channel_width: 10_000,
                audio_cutoff: 5_000,
                carrier_amplitude: None,
            },
            Self::Usb | Self::Lsb => DemodParams {
                channel_width: 3_000,
                audio_cutoff: 3_000,
                carrier_amplitude: Some(0.2),
            },
        }
    }
}

impl fmt::Display for Demod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Demod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| DomainError::UnknownDemod(s.to_string()))
    }
}
