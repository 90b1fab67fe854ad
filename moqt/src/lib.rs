//! An implementation of the Media over QUIC Transport protocol.
//!
//! A [Session] runs over a single QUIC connection (or WebTransport session) and acts as both publisher and subscriber.
//! Tracks are discovered with announcements, requested with subscriptions, and delivered one group per stream, so a
//! stale group can be abandoned without blocking newer ones.
//!
//! The wire format is defined in [message] and [coding]; the transport is abstracted by [transport::Connection].
pub mod announce;
pub mod coding;
pub mod message;
pub mod transport;

mod error;
mod path;
mod session;
mod util;

pub use error::*;
pub use path::*;
pub use session::*;

pub use announce::{AnnouncementTree, TrackHandler, TrackMux};
pub use coding::Parameters;
pub use util::Lock;
