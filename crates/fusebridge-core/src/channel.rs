//! The daemon's side of the protocol: reading requests and writing replies.

use bitflags::bitflags;
use fusebridge_proto::{OutEnvelope, WireError};

use crate::connection::Connection;
use crate::error::{ChannelError, Result};
use crate::lifecycle::Attachment;

bitflags! {
    /// Readiness reported by [`PeerHandle::poll`](crate::PeerHandle::poll).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollEvents: u32 {
        const POLLIN = 0x1;
        const POLLOUT = 0x4;
        const POLLERR = 0x8;
    }
}

impl Connection {
    pub(crate) fn try_read(&self, buf: &mut [u8]) -> Result<usize> {
        let (delivered, more) = {
            let mut state = self.lock();
            if state.released || state.peer == Attachment::Detached {
                return Err(ChannelError::Terminated);
            }
            if state.queues.pending_len() == 0 {
                return Err(if state.read_closed() {
                    ChannelError::Terminated
                } else {
                    ChannelError::WouldBlock
                });
            }
            let delivered = state.queues.deliver_front(buf)?;
            (delivered, state.queues.pending_len() > 0)
        };
        tracing::trace!(
            connection = %self.id(),
            unique = %delivered.unique,
            opcode = %delivered.opcode,
            len = delivered.len,
            "request delivered"
        );
        if more {
            self.readable.notify_waiters();
        }
        Ok(delivered.len)
    }

    /// Wait for the next pending request and copy it into `buf`.
    pub(crate) async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            // Created before the check so a wakeup in between is not lost.
            let notified = self.readable.notified();
            match self.try_read(buf) {
                Err(ChannelError::WouldBlock) => notified.await,
                other => return other,
            }
        }
    }

    /// Apply one reply envelope. Returns the number of bytes consumed.
    pub(crate) fn write(&self, buf: &[u8]) -> Result<usize> {
        let max = self.config.get().max_message_size;
        if buf.len() > max {
            let err = WireError::TooLarge { size: buf.len(), max };
            tracing::warn!(connection = %self.id(), error = %err, "rejected reply");
            return Err(err.into());
        }
        let envelope = OutEnvelope::decode(buf).map_err(|err| {
            tracing::warn!(connection = %self.id(), error = %err, "malformed reply");
            ChannelError::from(err)
        })?;
        let unique = envelope.header.unique;

        let request = {
            let mut state = self.lock();
            if state.released {
                return Err(ChannelError::Terminated);
            }
            state.queues.take_processing(unique)
        };
        let Some(request) = request else {
            tracing::warn!(connection = %self.id(), %unique, "reply for unknown request");
            return Err(ChannelError::UnknownUnique(unique));
        };

        let error = envelope.header.error;
        if error == 0 {
            if let Err(err) = request.out().check(envelope.payload.len()) {
                tracing::warn!(connection = %self.id(), %unique, error = %err, "reply violates output size");
                request.complete(Err(err.clone()));
                return Err(err);
            }
        }
        tracing::trace!(connection = %self.id(), %unique, error, "reply applied");
        if !request.complete(Ok((error, envelope.payload))) {
            tracing::debug!(connection = %self.id(), %unique, "sender went away before reply");
        }
        Ok(buf.len())
    }

    pub(crate) fn poll(&self) -> PollEvents {
        let state = self.lock();
        let mut events = PollEvents::POLLOUT;
        let closed = state.read_closed();
        if closed || state.queues.pending_len() > 0 {
            events |= PollEvents::POLLIN;
        }
        if closed {
            events |= PollEvents::POLLERR;
        }
        events
    }

    /// Wait until a read would not block.
    pub(crate) async fn wait_readable(&self) -> PollEvents {
        loop {
            let notified = self.readable.notified();
            let events = self.poll();
            if events.contains(PollEvents::POLLIN) {
                return events;
            }
            notified.await;
        }
    }
}
