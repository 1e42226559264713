//! Wire format spoken over the bridge device.
//!
//! Every message is a fixed little-endian header followed by opaque bytes.
//! Requests travel driver → daemon as an [`InEnvelope`]; replies travel back
//! as an [`OutEnvelope`] that echoes the request's `unique`.

pub mod envelope;
pub mod error;
pub mod header;
pub mod opcode;

pub use envelope::{InEnvelope, OutEnvelope};
pub use error::WireError;
pub use header::{InHeader, OutHeader, IN_HEADER_SIZE, OUT_HEADER_SIZE};
pub use opcode::opcodes;
