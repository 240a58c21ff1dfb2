//! WebSDR Protocol - Wire protocol for client communication
//!
//! This crate provides the inbound command decoding and the outbound
//! state-update message exchanged between browser clients and the
//! daemon. Each direction carries one JSON object per frame.

pub mod command;
pub mod update;

pub use command::{ClientCommand, Credentials, ProtocolError};
pub use update::{CurrentSource, StateUpdate};
