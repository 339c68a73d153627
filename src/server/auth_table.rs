//! Addresses that have presented valid credentials over UDP.

use std::collections::HashSet;
use std::net::SocketAddr;

use tokio::sync::RwLock;

/// Set of authenticated source addresses.
///
/// Lookups take a shared read lock, so concurrent checks do not contend;
/// marking takes the write lock. Entries never expire.
#[derive(Debug, Default)]
pub struct AuthTable {
    entries: RwLock<HashSet<SocketAddr>>,
}

impl AuthTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `addr` as authenticated. Returns `false` if it already was.
    pub async fn mark_authenticated(&self, addr: SocketAddr) -> bool {
        self.entries.write().await.insert(addr)
    }

    /// Whether `addr` has authenticated.
    pub async fn is_authenticated(&self, addr: &SocketAddr) -> bool {
        self.entries.read().await.contains(addr)
    }

    /// Number of authenticated addresses.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no address has authenticated yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
