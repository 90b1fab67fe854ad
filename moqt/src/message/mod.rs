//! Every message on the wire.
//!
//! Control messages are length-prefixed via [crate::coding::Message]; which message comes next is implied by the
//! stream type and the position on the stream, never by a tag.
//!
//! ```text
//! SESSION:   SessionClient -> SessionServer, then SessionUpdate in either direction
//!            (server-opened after setup: GoAway)
//! ANNOUNCE:  AnnouncePlease -> Announce*
//! SUBSCRIBE: Subscribe -> Info, then SubscribeUpdate* -> SubscribeGap*
//! INFO:      InfoRequest -> Info
//! FETCH:     Fetch -> Group, Frame*, with FetchUpdate* from the subscriber
//! GROUP:     Group, Frame*  (uni)
//! ```
mod announce;
mod fetch;
mod goaway;
mod group;
mod info;
mod order;
mod session;
mod stream;
mod subscribe;
mod version;

pub use announce::*;
pub use fetch::*;
pub use goaway::*;
pub use group::*;
pub use info::*;
pub use order::*;
pub use session::*;
pub use stream::*;
pub use subscribe::*;
pub use version::*;
