//! WebSDR Daemon - Session registry and WebSocket control server
//!
//! This crate provides the control plane of a multi-client WebSDR receiver:
//! - `registry` - Session registry actor owning every session and receiver
//! - `dispatch` - Applies decoded client commands to a session
//! - `encoder` - Composes per-session state updates from dirty flags
//! - `graph` - Guard around the shared processing graph
//! - `hardware` - Hardware source table and driver interface
//! - `server` - WebSocket server for client connections
//! - `monitor` - Process and registry monitoring
//! - `loopback` - In-process backend used without DSP hardware
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       websdrd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │    SdrServer    │────▶│       RegistryActor         │   │
//! │  │   (WebSocket)   │     │  (session owner, own thread)│   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ dispatch/encode   │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│     │ GraphGuard    SourceTable   │   │
//! │  │  (per client)   │     │ (FlowGraph)   (drivers)     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod engine;
pub mod graph;
pub mod hardware;
pub mod loopback;
pub mod monitor;
pub mod receiver;
pub mod registry;
pub mod server;
