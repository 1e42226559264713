use std::collections::VecDeque;

use fusebridge_proto::WireError;
use fusebridge_types::{Opcode, Unique};

use crate::error::{ChannelError, Result};
use crate::request::{Request, RequestState};

/// What a peer read handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Delivered {
    pub unique: Unique,
    pub opcode: Opcode,
    pub len: usize,
    /// False for one-way requests, which are gone once delivered.
    pub awaits_reply: bool,
}

/// The two FIFO queues of a connection.
///
/// A request sits in at most one of them. Callers hold the connection lock.
#[derive(Debug, Default)]
pub(crate) struct RequestQueues {
    pending: VecDeque<Request>,
    processing: VecDeque<Request>,
}

impl RequestQueues {
    pub(crate) fn push_pending(&mut self, mut request: Request) {
        debug_assert!(!request.unique().is_none());
        request.set_state(RequestState::Pending);
        self.pending.push_back(request);
    }

    /// Serialise the oldest pending request into `buf` and move it on.
    ///
    /// If `buf` cannot hold it the request stays at the head of `pending`.
    pub(crate) fn deliver_front(&mut self, buf: &mut [u8]) -> Result<Delivered> {
        let head = self.pending.front().ok_or(ChannelError::WouldBlock)?;
        let len = match head.envelope().encode_into(buf) {
            Ok(len) => len,
            Err(WireError::InsufficientData { need, have }) => {
                return Err(ChannelError::ReadBufferTooSmall { need, have })
            }
            Err(e) => return Err(e.into()),
        };
        let mut request = self.pending.pop_front().ok_or(ChannelError::WouldBlock)?;
        let delivered = Delivered {
            unique: request.unique(),
            opcode: request.opcode(),
            len,
            awaits_reply: request.expects_reply(),
        };
        if delivered.awaits_reply {
            request.set_state(RequestState::Processing);
            self.processing.push_back(request);
        }
        Ok(delivered)
    }

    /// Remove a delivered request so its reply can be applied.
    pub(crate) fn take_processing(&mut self, unique: Unique) -> Option<Request> {
        let pos = self.processing.iter().position(|r| r.unique() == unique)?;
        self.processing.remove(pos)
    }

    /// Remove a request from whichever queue holds it.
    pub(crate) fn remove(&mut self, unique: Unique) -> Option<Request> {
        if let Some(pos) = self.pending.iter().position(|r| r.unique() == unique) {
            return self.pending.remove(pos);
        }
        self.take_processing(unique)
    }

    pub(crate) fn contains(&self, unique: Unique) -> bool {
        self.pending.iter().any(|r| r.unique() == unique)
            || self.processing.iter().any(|r| r.unique() == unique)
    }

    /// Empty both queues, pending first.
    pub(crate) fn drain(&mut self) -> Vec<Request> {
        self.pending.drain(..).chain(self.processing.drain(..)).collect()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn processing_len(&self) -> usize {
        self.processing.len()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.pending.len() + self.processing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Completion, OutArg, RequestIn};
    use bytes::Bytes;
    use fusebridge_proto::{opcodes, InEnvelope, IN_HEADER_SIZE};
    use fusebridge_types::NodeId;
    use tokio::sync::oneshot;

    fn request(unique: u32, arg: &'static str) -> (Request, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        let mut req = Request::new(
            RequestIn::new(opcodes::LOOKUP, NodeId(1), Bytes::from_static(arg.as_bytes())),
            OutArg::with_capacity(64).spec(),
            Some(tx),
            None,
        );
        req.assign(Unique(unique));
        (req, rx)
    }

    fn one_way(unique: u32) -> Request {
        let mut req = Request::new(
            RequestIn::new(opcodes::FORGET, NodeId(9), Bytes::new()),
            OutArg::empty().spec(),
            None,
            None,
        );
        req.assign(Unique(unique));
        req
    }

    #[test]
    fn test_deliver_in_fifo_order() {
        let mut queues = RequestQueues::default();
        let mut receivers = Vec::new();
        for i in 1..=4 {
            let (req, rx) = request(i, "x");
            queues.push_pending(req);
            receivers.push(rx);
        }
        let mut buf = [0u8; 128];
        for i in 1..=4 {
            let delivered = queues.deliver_front(&mut buf).unwrap();
            assert_eq!(delivered.unique, Unique(i));
            let env = InEnvelope::decode(&buf[..delivered.len]).unwrap();
            assert_eq!(env.header.unique, Unique(i));
        }
        assert_eq!(queues.pending_len(), 0);
        assert_eq!(queues.processing_len(), 4);
    }

    #[test]
    fn test_empty_would_block() {
        let mut queues = RequestQueues::default();
        let mut buf = [0u8; 64];
        assert_eq!(queues.deliver_front(&mut buf), Err(ChannelError::WouldBlock));
    }

    #[test]
    fn test_small_buffer_keeps_head() {
        let mut queues = RequestQueues::default();
        let (req, _rx) = request(1, "foo");
        queues.push_pending(req);

        let mut small = [0u8; 8];
        assert_eq!(
            queues.deliver_front(&mut small),
            Err(ChannelError::ReadBufferTooSmall { need: IN_HEADER_SIZE + 3, have: 8 })
        );
        assert_eq!(queues.pending_len(), 1);
        assert_eq!(queues.processing_len(), 0);

        let mut buf = [0u8; 64];
        let delivered = queues.deliver_front(&mut buf).unwrap();
        assert_eq!(delivered.unique, Unique(1));
        assert_eq!(delivered.len, IN_HEADER_SIZE + 3);
    }

    #[test]
    fn test_one_way_skips_processing() {
        let mut queues = RequestQueues::default();
        queues.push_pending(one_way(3));
        let mut buf = [0u8; 64];
        let delivered = queues.deliver_front(&mut buf).unwrap();
        assert!(!delivered.awaits_reply);
        assert_eq!(queues.in_flight(), 0);
        assert!(queues.take_processing(Unique(3)).is_none());
    }

    #[test]
    fn test_take_processing_exact_match() {
        let mut queues = RequestQueues::default();
        let (a, _ra) = request(1, "a");
        let (b, _rb) = request(2, "b");
        queues.push_pending(a);
        queues.push_pending(b);
        let mut buf = [0u8; 64];
        queues.deliver_front(&mut buf).unwrap();
        queues.deliver_front(&mut buf).unwrap();

        let taken = queues.take_processing(Unique(2)).unwrap();
        assert_eq!(taken.unique(), Unique(2));
        assert_eq!(taken.state(), RequestState::Processing);
        assert!(queues.take_processing(Unique(2)).is_none());
        assert!(queues.take_processing(Unique(77)).is_none());
        assert!(queues.contains(Unique(1)));
        assert_eq!(queues.processing_len(), 1);
    }

    #[test]
    fn test_remove_from_either_queue() {
        let mut queues = RequestQueues::default();
        let (a, _ra) = request(1, "a");
        let (b, _rb) = request(2, "b");
        queues.push_pending(a);
        queues.push_pending(b);
        let mut buf = [0u8; 64];
        queues.deliver_front(&mut buf).unwrap();

        assert!(queues.remove(Unique(2)).is_some());
        assert!(queues.remove(Unique(1)).is_some());
        assert!(queues.remove(Unique(1)).is_none());
        assert_eq!(queues.in_flight(), 0);
    }

    #[test]
    fn test_drain_pending_first() {
        let mut queues = RequestQueues::default();
        for i in 1..=3 {
            let (req, _rx) = request(i, "z");
            queues.push_pending(req);
        }
        let mut buf = [0u8; 64];
        queues.deliver_front(&mut buf).unwrap();

        let drained: Vec<_> = queues.drain().iter().map(|r| r.unique()).collect();
        assert_eq!(drained, vec![Unique(2), Unique(3), Unique(1)]);
        assert_eq!(queues.in_flight(), 0);
    }
}
