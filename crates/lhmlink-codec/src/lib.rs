//! Single-buffer binary codec for the GUI link messages.
//!
//! A message is an 8-byte header (`id`, total `size`) followed by one
//! encoded body. Encoding takes three passes over the same field list:
//! - **measure** sums the encoded size
//! - **write** fills a buffer allocated once at that size
//! - **read** walks a received buffer and hands back a borrowing view
//!
//! Types opt in through [`Wire`], usually via [`wire_struct!`].

#[macro_use]
mod macros;

pub mod codec;
pub mod error;
pub mod stream;
pub mod wire;

pub use codec::{decode, encode, measure, Header, HEADER_SIZE};
pub use error::{CodecError, Result};
pub use stream::{MeasureStream, ReadStream, StreamMode, WriteStream};
pub use wire::{ListIter, ListView, Wire};
