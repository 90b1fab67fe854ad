//! Native endpoints for [moqt] sessions, over raw QUIC (`moqt://`) or WebTransport (`https://`).
mod client;
mod connection;
mod log;
mod server;

pub use client::*;
pub use connection::*;
pub use log::*;
pub use server::*;

// Re-export these crates.
pub use moqt;
pub use quinn;

/// The ALPN used for raw QUIC.
pub const ALPN_MOQT: &[u8] = b"moq-00";

/// The ALPN used for WebTransport over HTTP/3.
pub const ALPN_WEBTRANSPORT: &[u8] = b"h3";
