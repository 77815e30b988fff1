//! Wire protocol between workers, observers and the router
//!
//! Frames are single lines of space-separated tokens terminated by `\n`.
//! Every payload token is an integer or a fixed keyword, so no escaping
//! is ever needed.

mod codec;
mod frame;

pub use codec::*;
pub use frame::*;
