use bytes::{Buf, BufMut};
use fusebridge_types::{Gid, NodeId, Opcode, Pid, RequestContext, Uid, Unique};

use crate::error::WireError;

/// Size of [`InHeader`] on the wire.
pub const IN_HEADER_SIZE: usize = 32;

/// Size of [`OutHeader`] on the wire.
pub const OUT_HEADER_SIZE: usize = 16;

/// Header of a request delivered to the daemon.
///
/// ```text
/// [len: u32][opcode: u32][unique: u32][uid: u32][gid: u32][pid: u32][nodeid: u64]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InHeader {
    /// Total envelope size including this header.
    pub len: u32,
    pub opcode: Opcode,
    pub unique: Unique,
    pub uid: Uid,
    pub gid: Gid,
    pub pid: Pid,
    pub nodeid: NodeId,
}

impl InHeader {
    pub fn new(opcode: Opcode, unique: Unique, nodeid: NodeId, ctx: RequestContext, arg_len: usize) -> Self {
        Self {
            len: (IN_HEADER_SIZE + arg_len) as u32,
            opcode,
            unique,
            uid: ctx.uid,
            gid: ctx.gid,
            pid: ctx.pid,
            nodeid,
        }
    }

    pub fn context(&self) -> RequestContext {
        RequestContext {
            uid: self.uid,
            gid: self.gid,
            pid: self.pid,
        }
    }

    /// Number of argument bytes that follow the header.
    pub fn arg_len(&self) -> usize {
        (self.len as usize).saturating_sub(IN_HEADER_SIZE)
    }

    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.len);
        buf.put_slice(&self.opcode.to_le_bytes());
        buf.put_slice(&self.unique.to_le_bytes());
        buf.put_slice(&self.uid.to_le_bytes());
        buf.put_slice(&self.gid.to_le_bytes());
        buf.put_slice(&self.pid.to_le_bytes());
        buf.put_slice(&self.nodeid.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; IN_HEADER_SIZE] {
        let mut out = [0u8; IN_HEADER_SIZE];
        self.put(&mut &mut out[..]);
        out
    }

    /// Parse the header from the front of `buf`. Trailing bytes are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < IN_HEADER_SIZE {
            return Err(WireError::InsufficientData {
                need: IN_HEADER_SIZE,
                have: buf.len(),
            });
        }
        let mut cur = &buf[..IN_HEADER_SIZE];
        Ok(Self {
            len: cur.get_u32_le(),
            opcode: Opcode(cur.get_u32_le()),
            unique: Unique(cur.get_u32_le()),
            uid: Uid(cur.get_u32_le()),
            gid: Gid(cur.get_u32_le()),
            pid: Pid(cur.get_u32_le()),
            nodeid: NodeId(cur.get_u64_le()),
        })
    }
}

/// Header of a reply written by the daemon.
///
/// ```text
/// [len: u32][error: i32][unique: u32][padding: u32]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutHeader {
    /// Total envelope size including this header.
    pub len: u32,
    /// 0 on success, otherwise a negated errno.
    pub error: i32,
    pub unique: Unique,
}

impl OutHeader {
    pub fn new(unique: Unique, error: i32, payload_len: usize) -> Self {
        Self {
            len: (OUT_HEADER_SIZE + payload_len) as u32,
            error,
            unique,
        }
    }

    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.len);
        buf.put_i32_le(self.error);
        buf.put_slice(&self.unique.to_le_bytes());
        buf.put_u32_le(0);
    }

    pub fn to_bytes(&self) -> [u8; OUT_HEADER_SIZE] {
        let mut out = [0u8; OUT_HEADER_SIZE];
        self.put(&mut &mut out[..]);
        out
    }

    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < OUT_HEADER_SIZE {
            return Err(WireError::InsufficientData {
                need: OUT_HEADER_SIZE,
                have: buf.len(),
            });
        }
        let mut cur = &buf[..OUT_HEADER_SIZE];
        let len = cur.get_u32_le();
        let error = cur.get_i32_le();
        let unique = Unique(cur.get_u32_le());
        Ok(Self { len, error, unique })
    }
}
