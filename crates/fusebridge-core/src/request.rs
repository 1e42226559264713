//! A single operation travelling through a connection.

use bytes::Bytes;
use fusebridge_proto::InEnvelope;
use fusebridge_types::{errno, NodeId, Opcode, RequestContext, Unique};
use tokio::sync::{oneshot, OwnedSemaphorePermit};

use crate::error::{ChannelError, Result};

/// The caller's half of a request: what goes into the inbound envelope.
#[derive(Clone, Debug)]
pub struct RequestIn {
    pub opcode: Opcode,
    pub nodeid: NodeId,
    pub ctx: RequestContext,
    pub arg: Bytes,
}

impl RequestIn {
    pub fn new(opcode: Opcode, nodeid: NodeId, arg: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            nodeid,
            ctx: RequestContext::root(),
            arg: arg.into(),
        }
    }

    pub fn with_context(mut self, ctx: RequestContext) -> Self {
        self.ctx = ctx;
        self
    }
}

/// Size contract for a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutSpec {
    pub capacity: usize,
    /// Whether the reply may be shorter than `capacity`.
    pub variable: bool,
}

impl OutSpec {
    /// Check a successful reply's payload size against the contract.
    pub fn check(&self, size: usize) -> Result<()> {
        if size > self.capacity {
            return Err(ChannelError::ReplyOverflow {
                size,
                capacity: self.capacity,
            });
        }
        if !self.variable && size != self.capacity {
            return Err(ChannelError::ReplySizeMismatch {
                size,
                expected: self.capacity,
            });
        }
        Ok(())
    }
}

/// Caller-owned output buffer with a declared capacity.
#[derive(Debug)]
pub struct OutArg {
    spec: OutSpec,
    data: Vec<u8>,
}

impl OutArg {
    /// Accepts any reply of up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            spec: OutSpec {
                capacity,
                variable: true,
            },
            data: Vec::with_capacity(capacity),
        }
    }

    /// Accepts only replies of exactly `size` bytes.
    pub fn fixed(size: usize) -> Self {
        Self {
            spec: OutSpec {
                capacity: size,
                variable: false,
            },
            data: Vec::with_capacity(size),
        }
    }

    /// No result bytes expected.
    pub fn empty() -> Self {
        Self::fixed(0)
    }

    pub fn spec(&self) -> OutSpec {
        self.spec
    }

    pub fn capacity(&self) -> usize {
        self.spec.capacity
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn fill(&mut self, payload: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(payload);
    }
}

/// The operation's own outcome, as reported by the daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reply {
    /// 0 on success, otherwise a negated errno.
    pub error: i32,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    pub fn error_name(&self) -> &'static str {
        errno::to_string(self.error)
    }
}

/// Where a request is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestState {
    Unsent,
    Pending,
    Processing,
}

/// What the waiting sender receives: the reply status and payload, or the
/// reason the exchange failed.
pub(crate) type Completion = Result<(i32, Bytes)>;

pub(crate) struct Request {
    envelope: InEnvelope,
    out: OutSpec,
    state: RequestState,
    /// `None` for one-way requests, which are dropped once delivered.
    done: Option<oneshot::Sender<Completion>>,
    /// Outstanding-request slot, returned when the request is dropped.
    _permit: Option<OwnedSemaphorePermit>,
}

impl Request {
    pub(crate) fn new(
        req: RequestIn,
        out: OutSpec,
        done: Option<oneshot::Sender<Completion>>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            envelope: InEnvelope::new(req.opcode, Unique::NONE, req.nodeid, req.ctx, req.arg),
            out,
            state: RequestState::Unsent,
            done,
            _permit: permit,
        }
    }

    pub(crate) fn unique(&self) -> Unique {
        self.envelope.header.unique
    }

    pub(crate) fn opcode(&self) -> Opcode {
        self.envelope.header.opcode
    }

    pub(crate) fn envelope(&self) -> &InEnvelope {
        &self.envelope
    }

    pub(crate) fn out(&self) -> OutSpec {
        self.out
    }

    pub(crate) fn state(&self) -> RequestState {
        self.state
    }

    pub(crate) fn expects_reply(&self) -> bool {
        self.done.is_some()
    }

    pub(crate) fn assign(&mut self, unique: Unique) {
        debug_assert_eq!(self.state(), RequestState::Unsent);
        self.envelope.header.unique = unique;
    }

    pub(crate) fn set_state(&mut self, state: RequestState) {
        self.state = state;
    }

    /// Hand the outcome to the sender. Returns false if the sender is gone.
    pub(crate) fn complete(self, completion: Completion) -> bool {
        match self.done {
            Some(done) => done.send(completion).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("unique", &self.unique())
            .field("opcode", &self.opcode())
            .field("arg_len", &self.envelope.arg.len())
            .field("out", &self.out)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusebridge_proto::opcodes;

    #[test]
    fn test_out_spec_variable() {
        let spec = OutArg::with_capacity(128).spec();
        assert!(spec.check(0).is_ok());
        assert!(spec.check(40).is_ok());
        assert!(spec.check(128).is_ok());
        assert_eq!(
            spec.check(129),
            Err(ChannelError::ReplyOverflow { size: 129, capacity: 128 })
        );
    }

    #[test]
    fn test_out_spec_fixed() {
        let spec = OutArg::fixed(16).spec();
        assert!(spec.check(16).is_ok());
        assert_eq!(
            spec.check(8),
            Err(ChannelError::ReplySizeMismatch { size: 8, expected: 16 })
        );
        assert!(matches!(spec.check(17), Err(ChannelError::ReplyOverflow { .. })));
    }

    #[test]
    fn test_out_arg_fill() {
        let mut out = OutArg::with_capacity(8);
        assert!(out.is_empty());
        out.fill(b"abc");
        assert_eq!(out.data(), b"abc");
        assert_eq!(out.into_data(), b"abc".to_vec());
    }

    #[test]
    fn test_request_unassigned_until_enqueued() {
        let req = Request::new(
            RequestIn::new(opcodes::GETATTR, NodeId(1), Bytes::new()),
            OutArg::empty().spec(),
            None,
            None,
        );
        assert!(req.unique().is_none());
        assert_eq!(req.state(), RequestState::Unsent);
        assert!(!req.expects_reply());
    }

    #[test]
    fn test_complete_delivers_once() {
        let (tx, mut rx) = oneshot::channel();
        let mut req = Request::new(
            RequestIn::new(opcodes::LOOKUP, NodeId(1), "foo"),
            OutArg::with_capacity(4).spec(),
            Some(tx),
            None,
        );
        req.assign(Unique(3));
        assert!(req.complete(Ok((0, Bytes::from_static(b"ok")))));
        let (error, payload) = rx.try_recv().unwrap().unwrap();
        assert_eq!(error, 0);
        assert_eq!(&payload[..], b"ok");
    }

    #[test]
    fn test_reply_names() {
        assert!(Reply { error: 0 }.is_ok());
        assert_eq!(Reply { error: -38 }.error_name(), "ENOSYS");
    }
}
