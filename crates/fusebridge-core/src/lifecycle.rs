//! Attachment of the two endpoints and teardown of a connection.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fusebridge_types::{ConnectionId, Unique};

use crate::channel::PollEvents;
use crate::connection::Connection;
use crate::error::{ChannelError, Result};
use crate::registry::ConnectionRegistry;
use crate::request::{OutArg, Reply, RequestIn};

/// One of the two endpoints that keep a connection alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The mounted filesystem, which issues requests.
    Mount,
    /// The userspace daemon, which answers them.
    Peer,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Mount => f.write_str("mount"),
            Side::Peer => f.write_str("peer"),
        }
    }
}

/// Attachment state of one side. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attachment {
    #[default]
    Unattached,
    Attached,
    Detached,
}

impl Connection {
    pub(crate) fn attach(&self, side: Side) -> Result<()> {
        let mut state = self.lock();
        if state.released || state.side(side.other()) == Attachment::Detached {
            return Err(ChannelError::Terminated);
        }
        match state.side(side) {
            Attachment::Unattached => *state.side_mut(side) = Attachment::Attached,
            Attachment::Attached => return Err(ChannelError::AlreadyAttached(side)),
            Attachment::Detached => return Err(ChannelError::Terminated),
        }
        drop(state);
        tracing::info!(connection = %self.id(), %side, "side attached");
        Ok(())
    }

    /// Detach `side`. Returns true if this released the connection.
    ///
    /// Losing the peer fails every outstanding request, since nobody is left
    /// to answer. Losing the mount only stops new sends; requests already
    /// queued may still be answered until the peer goes too.
    pub(crate) fn detach(&self, side: Side) -> bool {
        let (drained, released) = {
            let mut state = self.lock();
            if state.side(side) != Attachment::Attached {
                return false;
            }
            *state.side_mut(side) = Attachment::Detached;
            let released = state.side(side.other()) != Attachment::Attached;
            let drained = if side == Side::Peer || released {
                state.queues.drain()
            } else {
                Vec::new()
            };
            if released {
                state.released = true;
            }
            (drained, released)
        };
        self.close_permits();

        let count = drained.len();
        for request in drained {
            request.complete(Err(ChannelError::Terminated));
        }
        if count > 0 {
            tracing::debug!(connection = %self.id(), %side, count, "force-completed outstanding requests");
        }
        self.readable.notify_waiters();

        tracing::info!(connection = %self.id(), %side, released, "side detached");
        released
    }
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Mount => Side::Peer,
            Side::Peer => Side::Mount,
        }
    }
}

/// Detaches one side exactly once and drops the registry entry on release.
struct Attached {
    conn: Arc<Connection>,
    registry: ConnectionRegistry,
    side: Side,
    detached: AtomicBool,
}

impl Attached {
    fn new(conn: Arc<Connection>, registry: ConnectionRegistry, side: Side) -> Self {
        Self {
            conn,
            registry,
            side,
            detached: AtomicBool::new(false),
        }
    }

    fn detach(&self) {
        if self.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.conn.detach(self.side) {
            self.registry.remove(self.conn.id());
        }
    }
}

impl Drop for Attached {
    fn drop(&mut self) {
        self.detach();
    }
}

/// The filesystem's handle on a connection.
///
/// Dropping it unmounts.
pub struct MountHandle {
    inner: Attached,
}

impl MountHandle {
    pub(crate) fn new(conn: Arc<Connection>, registry: ConnectionRegistry) -> Self {
        Self {
            inner: Attached::new(conn, registry, Side::Mount),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.conn.id()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.conn
    }

    /// Send a request and wait until the daemon answers it or the
    /// connection goes away.
    ///
    /// On success the reply payload is in `out` and the operation's own
    /// status is in [`Reply::error`].
    pub async fn request_send(&self, req: RequestIn, out: &mut OutArg) -> Result<Reply> {
        self.inner.conn.request_send(req, out).await
    }

    /// Like [`request_send`](Self::request_send), but returns
    /// `Interrupted` once `interrupt` resolves. The request is withdrawn
    /// first, so a later reply for it is rejected as unknown.
    pub async fn request_send_interruptible<I>(
        &self,
        req: RequestIn,
        out: &mut OutArg,
        interrupt: I,
    ) -> Result<Reply>
    where
        I: Future<Output = ()>,
    {
        self.inner.conn.request_send_interruptible(req, out, interrupt).await
    }

    /// Queue a request the daemon must not answer.
    pub async fn send_noreply(&self, req: RequestIn) -> Result<Unique> {
        self.inner.conn.send_noreply(req).await
    }

    pub fn unmount(&self) {
        self.inner.detach();
    }
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle").field("id", &self.id()).finish()
    }
}

/// The daemon's handle on a connection, standing in for the open device.
///
/// Dropping it releases the device.
pub struct PeerHandle {
    inner: Attached,
}

impl PeerHandle {
    pub(crate) fn new(conn: Arc<Connection>, registry: ConnectionRegistry) -> Self {
        Self {
            inner: Attached::new(conn, registry, Side::Peer),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.conn.id()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.conn
    }

    /// Wait for the next request and copy its envelope into `buf`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.conn.read(buf).await
    }

    pub fn try_read(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.conn.try_read(buf)
    }

    /// Deliver one reply envelope.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.inner.conn.write(buf)
    }

    pub fn poll(&self) -> PollEvents {
        self.inner.conn.poll()
    }

    pub async fn wait_readable(&self) -> PollEvents {
        self.inner.conn.wait_readable().await
    }

    pub fn release(&self) {
        self.inner.detach();
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle").field("id", &self.id()).finish()
    }
}
