//! Request/response bridge between a filesystem driver and its daemon.
//!
//! A [`Connection`] carries every operation of one mounted filesystem to a
//! userspace daemon and brings the result back. The filesystem side holds a
//! [`MountHandle`] and calls [`request_send`](MountHandle::request_send),
//! which queues the request and waits. The daemon side holds a
//! [`PeerHandle`] and works it like a character device: `read` hands out the
//! oldest pending request as an inbound envelope, `write` takes a reply
//! envelope, matches it by `unique` and wakes the sender.
//!
//! Connections live in a [`ConnectionRegistry`] until both handles are gone.
//! Whatever is still outstanding when the daemon disappears fails with
//! [`ChannelError::Terminated`].

mod channel;
pub mod config;
mod connection;
pub mod error;
mod lifecycle;
mod queue;
mod registry;
mod request;
mod unique;

pub use channel::PollEvents;
pub use config::ChannelConfig;
pub use connection::Connection;
pub use error::{ChannelError, Result};
pub use lifecycle::{Attachment, MountHandle, PeerHandle, Side};
pub use registry::ConnectionRegistry;
pub use request::{OutArg, OutSpec, Reply, RequestIn};
