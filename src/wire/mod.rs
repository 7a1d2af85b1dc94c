//! The wire layer: RESP2 values, framing, and a buffered connection.
//!
//! Everything above this module thinks in commands and replies; this module
//! owns the byte-level protocol. Sending is deliberately split in two:
//! [`WireConn::send`] only appends to the output buffer, a later
//! [`WireConn::flush`] performs the write. Rewrites rely on that split to
//! pipeline several backend commands per inbound command.

mod codec;
mod conn;
mod value;

pub use codec::{encode_command, RespCodec};
pub use conn::{Transport, WireConn};
pub use value::RespValue;
