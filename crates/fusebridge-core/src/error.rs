use fusebridge_proto::WireError;
use fusebridge_types::{ConnectionId, Errno, Unique};
use thiserror::Error;

use crate::lifecycle::Side;

/// Errors raised by the channel, to either the sender or the daemon.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The connection was torn down while the operation was outstanding.
    #[error("connection terminated")]
    Terminated,

    /// No daemon has opened the device yet.
    #[error("no daemon attached")]
    NotConnected,

    /// That side of the connection has attached before.
    #[error("{0} side already attached")]
    AlreadyAttached(Side),

    /// No connection with this ID is registered.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// A reply named a request that is not awaiting one.
    #[error("no request awaiting a reply with unique {0}")]
    UnknownUnique(Unique),

    /// The daemon's read buffer cannot hold the next request; it stays queued.
    #[error("read buffer too small: need {need} bytes, have {have}")]
    ReadBufferTooSmall { need: usize, have: usize },

    /// Nothing pending and the read was non-blocking.
    #[error("no request pending")]
    WouldBlock,

    /// A successful reply carried more bytes than the caller's buffer holds.
    #[error("reply of {size} bytes exceeds output capacity {capacity}")]
    ReplyOverflow { size: usize, capacity: usize },

    /// A fixed-size output got a reply of a different length.
    #[error("reply of {size} bytes does not match fixed output size {expected}")]
    ReplySizeMismatch { size: usize, expected: usize },

    /// The sender was interrupted or timed out before the reply arrived.
    #[error("request interrupted")]
    Interrupted,

    /// Every nonzero request ID is held by an outstanding request.
    #[error("unique id space exhausted")]
    IdSpaceExhausted,

    /// The encoded request is larger than `max_message_size`.
    #[error("request of {size} bytes exceeds message limit {max}")]
    RequestTooLarge { size: usize, max: usize },

    /// The daemon wrote bytes that do not decode as a reply.
    #[error("malformed reply: {0}")]
    Malformed(#[from] WireError),
}

impl ChannelError {
    /// The negated errno a character device would return for this error.
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::Terminated => Errno::ENOTCONN,
            Self::NotConnected => Errno::EPROTO,
            Self::AlreadyAttached(_) => Errno::EBUSY,
            Self::UnknownConnection(_) => Errno::ENODEV,
            Self::UnknownUnique(_) => Errno::ENOENT,
            Self::ReadBufferTooSmall { .. } => Errno::EINVAL,
            Self::WouldBlock => Errno::EAGAIN,
            Self::ReplyOverflow { .. } | Self::ReplySizeMismatch { .. } => Errno::EPROTO,
            Self::Interrupted => Errno::EINTR,
            Self::IdSpaceExhausted => Errno::EBUSY,
            Self::RequestTooLarge { .. } => Errno::EOVERFLOW,
            Self::Malformed(_) => Errno::EINVAL,
        };
        -code
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
