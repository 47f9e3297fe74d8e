//! chatline - real-time text broadcast over WebSocket.
//!
//! The server keeps an append-only history of every message it accepts and
//! fans each one out to all connected peers. New peers receive the full
//! history before the live stream. The client is a small terminal UI that
//! shows the shared history while the operator types.

pub mod client;
pub mod config;
pub mod history;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod terminal;
