//! The single console connection.
//!
//! At most one connection handle exists at a time. A handle is either fully
//! live (transport up and console answering) or it is killed and rebuilt;
//! a half-dead handle is never handed out.

use std::sync::Arc;
use std::time::Duration;

use fleetlink_core::{identities, Bus, ConnectTarget, Connection};
use tokio::sync::Mutex;

use crate::error::Result;

/// Bound on every liveness probe.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of the console connection handle.
pub struct ConnectionManager {
    bus: Arc<dyn Bus>,
    handle: Mutex<Option<Arc<dyn Connection>>>,
}

impl ConnectionManager {
    /// Create a manager with no connection.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self {
            bus,
            handle: Mutex::new(None),
        }
    }

    /// Return a live console connection, building one if needed.
    ///
    /// A console that is a peer on the local bus is preferred over a remote
    /// connection. `Ok(None)` means no connection is possible with the
    /// current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the local peer list cannot be read or the
    /// connection cannot be opened.
    pub async fn get(&self, target: Option<ConnectTarget>) -> Result<Option<Arc<dyn Connection>>> {
        let mut handle = self.handle.lock().await;

        if let Some(existing) = handle.as_ref() {
            if existing.is_connected(LIVENESS_TIMEOUT).await
                && existing.is_peer_connected(LIVENESS_TIMEOUT).await
            {
                return Ok(Some(Arc::clone(existing)));
            }
        }

        if let Some(stale) = handle.take() {
            tracing::debug!(peer = %stale.peer(), "Discarding stale console connection");
            stale.kill().await;
        }

        let peers = self.bus.peers(LIVENESS_TIMEOUT).await?;
        if peers.iter().any(|p| p == identities::CONSOLE) {
            let conn = self.bus.connect_local(identities::CONSOLE).await?;
            let connected = conn.is_connected(LIVENESS_TIMEOUT).await;
            tracing::info!(connected, "Using console on the local bus");
            *handle = Some(Arc::clone(&conn));
            return Ok(Some(conn));
        }

        let Some(target) = target else {
            tracing::warn!("Console address or server key not resolved, cannot connect");
            return Ok(None);
        };

        tracing::info!(address = %target.address, identity = %target.identity, "Connecting to console");
        let conn = self.bus.connect(&target).await?;
        if !conn.is_peer_connected(LIVENESS_TIMEOUT).await {
            tracing::error!(
                address = %target.address,
                peer = %target.peer,
                "Console peer did not answer on new connection"
            );
        }

        *handle = Some(Arc::clone(&conn));
        Ok(Some(conn))
    }

    /// The current handle without probing it.
    pub async fn current(&self) -> Option<Arc<dyn Connection>> {
        self.handle.lock().await.clone()
    }

    /// Kill and drop the current handle, if any.
    pub async fn close(&self) {
        if let Some(conn) = self.handle.lock().await.take() {
            tracing::debug!(peer = %conn.peer(), "Closing console connection");
            conn.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlink_core::mock::MockBus;

    fn target() -> ConnectTarget {
        ConnectTarget {
            address: "tcp://10.0.0.1:22916".into(),
            serverkey: "vc-sk".into(),
            peer: identities::CONSOLE.into(),
            identity: "bldg-1".into(),
        }
    }

    #[tokio::test]
    async fn no_target_no_connection() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let manager = ConnectionManager::new(bus.clone());
        assert!(manager.get(None).await.unwrap().is_none());
        assert_eq!(bus.connect_count(), 0);
    }

    #[tokio::test]
    async fn live_connection_is_reused() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let manager = ConnectionManager::new(bus.clone());

        let first = manager.get(Some(target())).await.unwrap().unwrap();
        let second = manager.get(Some(target())).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(bus.connect_count(), 1);
    }

    #[tokio::test]
    async fn dead_connection_is_rebuilt() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let manager = ConnectionManager::new(bus.clone());

        manager.get(Some(target())).await.unwrap().unwrap();
        bus.console().set_reachable(false);
        manager.get(Some(target())).await.unwrap().unwrap();

        assert_eq!(bus.connect_count(), 2);
        let conns = bus.connections();
        assert!(conns[0].is_killed());
        assert!(!conns[1].is_killed());
    }

    #[tokio::test]
    async fn unanswered_peer_still_returns_handle() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.console().set_reachable(false);
        let manager = ConnectionManager::new(bus.clone());

        let conn = manager.get(Some(target())).await.unwrap();
        assert!(conn.is_some());
    }

    #[tokio::test]
    async fn local_console_is_preferred() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.add_peer(identities::CONSOLE);
        let manager = ConnectionManager::new(bus.clone());

        let conn = manager.get(Some(target())).await.unwrap().unwrap();
        assert!(conn.address().is_none());
        assert_eq!(bus.connect_targets(), vec![None]);
    }

    #[tokio::test]
    async fn close_kills_handle() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let manager = ConnectionManager::new(bus.clone());

        manager.get(Some(target())).await.unwrap();
        manager.close().await;
        assert!(manager.current().await.is_none());
        assert!(bus.connections()[0].is_killed());
    }

    #[tokio::test]
    async fn refused_connection_is_error() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.refuse_connections(true);
        let manager = ConnectionManager::new(bus.clone());
        assert!(manager.get(Some(target())).await.is_err());
        assert!(manager.current().await.is_none());
    }
}
