use bytes::{BufMut, Bytes, BytesMut};
use fusebridge_types::{is_valid_reply_error, NodeId, Opcode, RequestContext, Unique};

use crate::error::WireError;
use crate::header::{InHeader, OutHeader, IN_HEADER_SIZE, OUT_HEADER_SIZE};

/// A request as read by the daemon: header plus opaque argument bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InEnvelope {
    pub header: InHeader,
    pub arg: Bytes,
}

impl InEnvelope {
    pub fn new(opcode: Opcode, unique: Unique, nodeid: NodeId, ctx: RequestContext, arg: Bytes) -> Self {
        Self {
            header: InHeader::new(opcode, unique, nodeid, ctx, arg.len()),
            arg,
        }
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        IN_HEADER_SIZE + self.arg.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Write the envelope to the start of `buf`, returning the bytes written.
    ///
    /// Nothing is written when `buf` is too small.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let len = self.len();
        if buf.len() < len {
            return Err(WireError::InsufficientData {
                need: len,
                have: buf.len(),
            });
        }
        let mut cursor = &mut buf[..len];
        self.header.put(&mut cursor);
        cursor.put_slice(&self.arg);
        Ok(len)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        self.header.put(&mut buf);
        buf.extend_from_slice(&self.arg);
        buf.freeze()
    }

    /// Parse a complete request. `buf` must be exactly the envelope.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let header = InHeader::parse(buf)?;
        if header.len as usize != buf.len() {
            return Err(WireError::LengthMismatch {
                declared: header.len as usize,
                actual: buf.len(),
            });
        }
        Ok(Self {
            header,
            arg: Bytes::copy_from_slice(&buf[IN_HEADER_SIZE..]),
        })
    }
}

/// A reply as written by the daemon: header plus opaque result bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutEnvelope {
    pub header: OutHeader,
    pub payload: Bytes,
}

impl OutEnvelope {
    /// Successful reply carrying `payload`.
    pub fn reply(unique: Unique, payload: Bytes) -> Self {
        Self {
            header: OutHeader::new(unique, 0, payload.len()),
            payload,
        }
    }

    /// Failed reply; `errno` is positive and is sent negated.
    pub fn error(unique: Unique, errno: i32) -> Self {
        Self {
            header: OutHeader::new(unique, -errno.abs(), 0),
            payload: Bytes::new(),
        }
    }

    pub fn len(&self) -> usize {
        OUT_HEADER_SIZE + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        self.header.put(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parse and validate a reply. `buf` must be exactly one envelope.
    ///
    /// Rejects a length field that disagrees with `buf`, a status outside
    /// `(-1000, 0]`, and an error status that carries payload bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let header = OutHeader::parse(buf)?;
        if header.len as usize != buf.len() {
            return Err(WireError::LengthMismatch {
                declared: header.len as usize,
                actual: buf.len(),
            });
        }
        if !is_valid_reply_error(header.error) {
            return Err(WireError::InvalidStatus(header.error));
        }
        let payload = &buf[OUT_HEADER_SIZE..];
        if header.error != 0 && !payload.is_empty() {
            return Err(WireError::ErrorWithPayload {
                error: header.error,
                len: payload.len(),
            });
        }
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
