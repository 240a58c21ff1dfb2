//! Session identifiers and the stream names derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DomainError;

/// Minimum width of a rendered session id, zero padded.
pub const STREAM_ID_WIDTH: usize = 4;

/// Suffix appended to a session id to form its audio stream name.
pub const STREAM_SUFFIX: &str = ".ogg";

/// Maximum length of a stream name, suffix included.
pub const STREAM_NAME_LEN: usize = 8;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// Session Identifier
// ============================================================================

/// Identifier of one live session, e.g. `"00a7"`.
///
/// Rendered in base 36 from a monotonically increasing counter. The stream
/// label a client uses to fetch audio is the id plus [`STREAM_SUFFIX`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an already rendered id. Does not validate the format.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The stream label, e.g. `"00a7.ogg"`.
    pub fn stream_name(&self) -> String {
        format!("{}{STREAM_SUFFIX}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Id Generation
// ============================================================================

/// Renders `value` in lower-case base 36, left-padded with zeros to `width`.
pub fn render_base36(mut value: u64, width: usize) -> String {
    let mut digits = Vec::with_capacity(width.max(4));
    loop {
        let digit = BASE36_DIGITS
            .get((value % 36) as usize)
            .copied()
            .unwrap_or(b'0');
        digits.push(digit);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    while digits.len() < width {
        digits.push(b'0');
    }
    digits.iter().rev().map(|&b| char::from(b)).collect()
}

/// Hands out session ids from a monotonically increasing counter.
///
/// The counter only moves forward, so an id is never handed out twice while
/// its session is alive. Once the rendered stream name no longer fits
/// [`STREAM_NAME_LEN`] every further call fails with
/// [`DomainError::IdOverflow`].
#[derive(Debug, Default)]
pub struct StreamIdGenerator {
    next: u64,
}

impl StreamIdGenerator {
    /// Creates a generator starting at counter 0 (`"0000"`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator starting at an arbitrary counter value.
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Returns the next id, advancing the counter.
    pub fn next_id(&mut self) -> Result<SessionId, DomainError> {
        let counter = self.next;
        self.next = self.next.saturating_add(1);

        let rendered = render_base36(counter, STREAM_ID_WIDTH);
        if rendered.len() + STREAM_SUFFIX.len() > STREAM_NAME_LEN {
            return Err(DomainError::IdOverflow {
                counter,
                rendered,
                max: STREAM_NAME_LEN,
            });
        }
        Ok(SessionId(rendered))
    }
}
