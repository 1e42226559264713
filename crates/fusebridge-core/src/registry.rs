use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fusebridge_config::{Config, ConfigError, ConfigManager};
use fusebridge_types::ConnectionId;

use crate::config::ChannelConfig;
use crate::connection::Connection;
use crate::error::{ChannelError, Result};
use crate::lifecycle::{MountHandle, PeerHandle, Side};

struct RegistryInner {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    next_id: AtomicU64,
    config: Arc<ConfigManager<ChannelConfig>>,
}

/// All live connections, keyed by ID.
///
/// Cloning is cheap and every clone sees the same table. A connection can be
/// started from either end: [`open_device`](Self::open_device) when the
/// daemon comes first, [`create_mounted`](Self::create_mounted) when the
/// filesystem does. The other end then joins by ID.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(config: ChannelConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_manager(Arc::new(ConfigManager::new(config))))
    }

    /// Share an existing manager so reloads reach every connection.
    pub fn with_manager(config: Arc<ConfigManager<ChannelConfig>>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: DashMap::new(),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn config(&self) -> &Arc<ConfigManager<ChannelConfig>> {
        &self.inner.config
    }

    fn create(&self, first: Side) -> Arc<Connection> {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Connection::new(id, Arc::clone(&self.inner.config), first));
        self.inner.connections.insert(id, Arc::clone(&conn));
        conn
    }

    /// New connection with the daemon already attached.
    pub fn open_device(&self) -> PeerHandle {
        PeerHandle::new(self.create(Side::Peer), self.clone())
    }

    /// New connection with the filesystem already attached.
    pub fn create_mounted(&self) -> MountHandle {
        MountHandle::new(self.create(Side::Mount), self.clone())
    }

    /// Attach the filesystem to a connection opened by a daemon.
    pub fn mount(&self, id: ConnectionId) -> Result<MountHandle> {
        let conn = self.lookup(id)?;
        conn.attach(Side::Mount)?;
        Ok(MountHandle::new(conn, self.clone()))
    }

    /// Attach a daemon to a connection created by a mount.
    pub fn attach_peer(&self, id: ConnectionId) -> Result<PeerHandle> {
        let conn = self.lookup(id)?;
        conn.attach(Side::Peer)?;
        Ok(PeerHandle::new(conn, self.clone()))
    }

    fn lookup(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        self.get(id).ok_or(ChannelError::UnknownConnection(id))
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }

    pub(crate) fn remove(&self, id: ConnectionId) {
        if self.inner.connections.remove(&id).is_some() {
            tracing::debug!(connection = %id, remaining = self.len(), "connection removed from registry");
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_manager(Arc::new(ConfigManager::new(ChannelConfig::default())))
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Attachment;

    #[test]
    fn test_ids_are_distinct() {
        let registry = ConnectionRegistry::default();
        let a = registry.open_device();
        let b = registry.create_mounted();
        assert_ne!(a.id(), b.id());
        assert!(registry.get(a.id()).is_some());
        assert!(registry.get(b.id()).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ChannelConfig {
            max_outstanding: 0,
            ..ChannelConfig::default()
        };
        assert!(ConnectionRegistry::new(config).is_err());
    }

    #[test]
    fn test_attach_other_side() {
        let registry = ConnectionRegistry::default();
        let peer = registry.open_device();
        let mount = registry.mount(peer.id()).unwrap();
        let conn = registry.get(peer.id()).unwrap();
        assert_eq!(conn.attachment(Side::Mount), Attachment::Attached);
        assert_eq!(conn.attachment(Side::Peer), Attachment::Attached);
        assert_eq!(mount.id(), peer.id());
    }

    #[test]
    fn test_second_attach_rejected() {
        let registry = ConnectionRegistry::default();
        let mount = registry.create_mounted();
        let _peer = registry.attach_peer(mount.id()).unwrap();
        assert_eq!(
            registry.attach_peer(mount.id()).unwrap_err(),
            ChannelError::AlreadyAttached(Side::Peer)
        );
        assert_eq!(
            registry.mount(mount.id()).unwrap_err(),
            ChannelError::AlreadyAttached(Side::Mount)
        );
    }

    #[test]
    fn test_unknown_connection() {
        let registry = ConnectionRegistry::default();
        assert_eq!(
            registry.mount(ConnectionId(42)).unwrap_err(),
            ChannelError::UnknownConnection(ConnectionId(42))
        );
    }

    #[test]
    fn test_attach_after_other_side_left() {
        let registry = ConnectionRegistry::default();
        let peer = registry.open_device();
        let mount = registry.mount(peer.id()).unwrap();
        let id = peer.id();
        peer.release();
        // The mount still holds the entry, but the daemon is gone for good.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.attach_peer(id).unwrap_err(), ChannelError::Terminated);
        drop(mount);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entry_removed_after_both_release() {
        let registry = ConnectionRegistry::default();
        let peer = registry.open_device();
        let id = peer.id();
        let mount = registry.mount(id).unwrap();
        let conn = registry.get(id).unwrap();

        mount.unmount();
        assert_eq!(registry.len(), 1);
        assert!(!conn.is_released());

        drop(peer);
        assert!(registry.is_empty());
        assert!(registry.get(id).is_none());
        assert!(conn.is_released());

        // Unmounting again is a no-op.
        mount.unmount();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_single_sided_release() {
        let registry = ConnectionRegistry::default();
        let mount = registry.create_mounted();
        assert_eq!(registry.len(), 1);
        drop(mount);
        assert!(registry.is_empty());
    }
}
