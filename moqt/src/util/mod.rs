mod close;
mod lock;
mod queue;
mod spawn;

pub(crate) use close::*;
pub use lock::*;
pub(crate) use queue::*;
pub(crate) use spawn::*;
