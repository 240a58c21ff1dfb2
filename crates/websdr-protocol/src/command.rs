//! Decoding of client commands.
//!
//! Decoding is best effort per field. The frame must be a JSON object;
//! past that, every recognised key is checked on its own and a key with
//! the wrong value type is dropped without affecting its siblings.
//! Unknown keys are ignored.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use websdr_core::Demod;

/// Login credentials carried by a `login` key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// One decoded client message.
///
/// Every field is `None`/`false` when its key was absent or ill-typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientCommand {
    /// `login: {user, pass}`, both strings.
    pub login: Option<Credentials>,
    /// `logout` present with any value (ignored when `login` decoded).
    pub logout: bool,
    /// `freq_offset`: integer Hz.
    pub freq_offset: Option<i64>,
    /// `hw_freq`: integer Hz.
    pub hw_freq: Option<i64>,
    /// `gain`: any JSON number.
    pub gain: Option<f64>,
    /// `auto_gain`: boolean.
    pub auto_gain: Option<bool>,
    /// `demod`: string naming a supported demodulator.
    pub demod: Option<Demod>,
    /// `source`: integer index. Bounds are checked by the dispatcher,
    /// which knows the table size.
    pub source: Option<i64>,
}

impl ClientCommand {
    /// Parses a raw frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the bytes are not JSON
    /// - `ProtocolError::NotAnObject` if the JSON is not an object
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::malformed)?;
        match value {
            Value::Object(map) => Ok(Self::from_object(&map)),
            other => Err(ProtocolError::NotAnObject(json_kind(&other))),
        }
    }

    /// Decodes the recognised keys of an already parsed object.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let login = obj.get("login").and_then(credentials);
        Self {
            logout: login.is_none() && obj.contains_key("logout"),
            login,
            freq_offset: obj.get("freq_offset").and_then(Value::as_i64),
            hw_freq: obj.get("hw_freq").and_then(Value::as_i64),
            gain: obj.get("gain").and_then(Value::as_f64),
            auto_gain: obj.get("auto_gain").and_then(Value::as_bool),
            demod: obj
                .get("demod")
                .and_then(Value::as_str)
                .and_then(Demod::from_name),
            source: obj.get("source").and_then(Value::as_i64),
        }
    }

    /// Returns true if no recognised key decoded.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns true if the command carries a hardware parameter write.
    pub fn touches_hardware(&self) -> bool {
        self.hw_freq.is_some() || self.gain.is_some() || self.auto_gain.is_some()
    }
}

fn credentials(value: &Value) -> Option<Credentials> {
    let obj = value.as_object()?;
    let user = obj.get("user")?.as_str()?;
    let pass = obj.get("pass")?.as_str()?;
    Some(Credentials {
        user: user.to_string(),
        pass: pass.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors that make a whole frame undecodable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    Malformed(String),

    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl ProtocolError {
    /// Creates a malformed-frame error from any error type.
    pub fn malformed<E: fmt::Display>(err: E) -> Self {
        Self::Malformed(err.to_string())
    }
}
