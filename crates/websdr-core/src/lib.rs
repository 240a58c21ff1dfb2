//! WebSDR Core - Shared types for the receiver control plane
//!
//! This crate provides the domain types shared between the wire
//! protocol (websdr-protocol) and the daemon (websdrd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod demod;
pub mod error;
pub mod source;
pub mod stream;

// Re-exports for convenience
pub use demod::{Demod, DemodParams};
pub use error::{DomainError, DomainResult};
pub use source::SourceDescriptor;
pub use stream::{SessionId, StreamIdGenerator, STREAM_ID_WIDTH, STREAM_NAME_LEN, STREAM_SUFFIX};
