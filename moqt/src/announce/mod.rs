//! Tracks that are currently announced, indexed by path so prefix subscribers can be served.
//!
//! A subscriber first receives every matching announcement as ACTIVE, then a single LIVE marker,
//! followed by each ACTIVE/ENDED transition as it happens. A [TrackMux] pairs the tree with a handler per path.
mod mux;
mod tree;

pub use mux::*;
pub use tree::*;
