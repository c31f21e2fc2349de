//! Common types shared by every OpalRDP crate: byte cursors, the
//! [`Encode`] / [`Decode`] traits and their error kinds, and a growable
//! output buffer.

#[macro_use]
mod macros;

mod cursor;
mod decode;
mod encode;
mod error;
mod write_buf;

// Flat API hierarchy of common traits and types

pub use self::cursor::*;
pub use self::decode::*;
pub use self::encode::*;
pub use self::error::*;
pub use self::write_buf::*;
