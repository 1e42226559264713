//! Per-mount connection state and the sending half of the protocol.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fusebridge_config::ConfigManager;
use fusebridge_proto::IN_HEADER_SIZE;
use fusebridge_types::{ConnectionId, Unique};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::lifecycle::{Attachment, Side};
use crate::queue::RequestQueues;
use crate::request::{Completion, OutArg, Reply, Request, RequestIn};
use crate::unique::UniqueAllocator;

#[derive(Debug)]
pub(crate) struct ConnectionState {
    pub(crate) queues: RequestQueues,
    pub(crate) unique: UniqueAllocator,
    pub(crate) mount: Attachment,
    pub(crate) peer: Attachment,
    pub(crate) released: bool,
}

impl ConnectionState {
    fn new(first: Side) -> Self {
        let mut state = Self {
            queues: RequestQueues::default(),
            unique: UniqueAllocator::default(),
            mount: Attachment::Unattached,
            peer: Attachment::Unattached,
            released: false,
        };
        *state.side_mut(first) = Attachment::Attached;
        state
    }

    pub(crate) fn side(&self, side: Side) -> Attachment {
        match side {
            Side::Mount => self.mount,
            Side::Peer => self.peer,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut Attachment {
        match side {
            Side::Mount => &mut self.mount,
            Side::Peer => &mut self.peer,
        }
    }

    /// Whether a new request may be queued.
    fn check_sendable(&self) -> Result<()> {
        if self.released || self.mount == Attachment::Detached || self.peer == Attachment::Detached {
            return Err(ChannelError::Terminated);
        }
        if self.peer == Attachment::Unattached {
            return Err(ChannelError::NotConnected);
        }
        Ok(())
    }

    /// Whether peer reads should fail instead of waiting.
    pub(crate) fn read_closed(&self) -> bool {
        self.released
            || self.peer == Attachment::Detached
            || (self.mount == Attachment::Detached && self.queues.pending_len() == 0)
    }
}

/// Shared state of one mounted filesystem instance.
///
/// Held by the registry and by whichever of [`MountHandle`](crate::MountHandle)
/// and [`PeerHandle`](crate::PeerHandle) are alive.
pub struct Connection {
    id: ConnectionId,
    pub(crate) config: Arc<ConfigManager<ChannelConfig>>,
    pub(crate) state: Mutex<ConnectionState>,
    /// Signalled whenever peer readers should re-check the queues.
    pub(crate) readable: Notify,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, config: Arc<ConfigManager<ChannelConfig>>, first: Side) -> Self {
        let max_outstanding = config.get().max_outstanding;
        tracing::info!(connection = %id, side = %first, max_outstanding, "connection created");
        Self {
            id,
            config,
            state: Mutex::new(ConnectionState::new(first)),
            readable: Notify::new(),
            permits: Arc::new(Semaphore::new(max_outstanding)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn attachment(&self, side: Side) -> Attachment {
        self.state.lock().side(side)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().queues.pending_len()
    }

    pub fn processing_len(&self) -> usize {
        self.state.lock().queues.processing_len()
    }

    /// True once both sides have detached and the queues were emptied.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock()
    }

    pub(crate) fn close_permits(&self) {
        self.permits.close();
    }

    /// Send a request and wait for its reply.
    pub(crate) async fn request_send(&self, req: RequestIn, out: &mut OutArg) -> Result<Reply> {
        self.request_send_interruptible(req, out, std::future::pending::<()>())
            .await
    }

    /// Like [`request_send`](Self::request_send), but gives up with
    /// `Interrupted` as soon as `interrupt` resolves.
    pub(crate) async fn request_send_interruptible<I>(
        &self,
        req: RequestIn,
        out: &mut OutArg,
        interrupt: I,
    ) -> Result<Reply>
    where
        I: Future<Output = ()>,
    {
        let timeout = self.config.get().request_timeout();
        tokio::select! {
            biased;
            result = self.exchange(req, out, timeout) => result,
            _ = interrupt => {
                tracing::debug!(connection = %self.id, "request interrupted");
                Err(ChannelError::Interrupted)
            }
        }
    }

    async fn exchange(&self, req: RequestIn, out: &mut OutArg, timeout: Option<Duration>) -> Result<Reply> {
        let exchange = self.send_and_wait(req, out);
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(
                        connection = %self.id,
                        timeout_ms = limit.as_millis() as u64,
                        "request timed out"
                    );
                    Err(ChannelError::Interrupted)
                }
            },
            None => exchange.await,
        }
    }

    async fn send_and_wait(&self, req: RequestIn, out: &mut OutArg) -> Result<Reply> {
        self.check_size(&req)?;
        self.lock().check_sendable()?;
        let permit = self.acquire_permit().await?;

        let (tx, rx) = oneshot::channel();
        let unique = self.enqueue(Request::new(req, out.spec(), Some(tx), Some(permit)))?;
        let mut guard = CancelGuard {
            conn: self,
            unique,
            armed: true,
        };

        let completion: Completion = rx.await.unwrap_or(Err(ChannelError::Terminated));
        // Whoever sent the completion already took the request off its queue.
        guard.armed = false;

        let (error, payload) = completion?;
        out.fill(&payload);
        tracing::trace!(connection = %self.id, %unique, error, len = payload.len(), "request completed");
        Ok(Reply { error })
    }

    /// Queue a request that expects no reply, such as FORGET.
    ///
    /// It still occupies an outstanding-request slot until the peer reads it.
    pub(crate) async fn send_noreply(&self, req: RequestIn) -> Result<Unique> {
        self.check_size(&req)?;
        self.lock().check_sendable()?;
        let permit = self.acquire_permit().await?;
        self.enqueue(Request::new(req, OutArg::empty().spec(), None, Some(permit)))
    }

    fn check_size(&self, req: &RequestIn) -> Result<()> {
        let size = IN_HEADER_SIZE + req.arg.len();
        let max = self.config.get().max_message_size;
        if size > max {
            return Err(ChannelError::RequestTooLarge { size, max });
        }
        Ok(())
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ChannelError::Terminated)
    }

    /// Assign an ID and append to `pending`, then wake peer readers.
    ///
    /// Every waiting reader is woken. One of them takes the request and the
    /// rest see `WouldBlock` and wait again.
    fn enqueue(&self, mut request: Request) -> Result<Unique> {
        let unique = {
            let mut state = self.lock();
            state.check_sendable()?;
            let ConnectionState { queues, unique, .. } = &mut *state;
            let id = unique.allocate(queues.in_flight(), |u| queues.contains(u))?;
            request.assign(id);
            tracing::trace!(
                connection = %self.id,
                unique = %id,
                opcode = %request.opcode(),
                "request queued"
            );
            queues.push_pending(request);
            id
        };
        self.readable.notify_waiters();
        Ok(unique)
    }

    /// Drop a request whose sender stopped waiting.
    fn cancel(&self, unique: Unique) {
        let removed = self.lock().queues.remove(unique);
        if let Some(request) = removed {
            tracing::debug!(
                connection = %self.id,
                %unique,
                state = ?request.state(),
                "request cancelled"
            );
        }
    }
}

/// Removes the request from its queue if the sending future is dropped
/// before a completion arrives.
struct CancelGuard<'a> {
    conn: &'a Connection,
    unique: Unique,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.cancel(self.unique);
        }
    }
}
