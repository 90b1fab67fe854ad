mod decode;
mod encode;
mod message;
mod params;
mod path;
mod varint;

pub use decode::*;
pub use encode::*;
pub use message::*;
pub use params::*;
pub use varint::*;
