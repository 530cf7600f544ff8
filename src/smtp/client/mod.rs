//! SMTP client plumbing: transparency codec and network streams

mod codec;
#[cfg(test)]
pub(crate) mod mock;
pub mod net;

pub use self::codec::*;
