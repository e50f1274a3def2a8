//! Connection pool keyed by server address.
//!
//! Each address owns a stack of idle connections. `acquire` pops from the
//! stack or dials on a miss, `release` pushes back, and `evict` drops every
//! idle connection for an address that has proven faulty. Connections the
//! connector reports as unusable are dropped on both paths. All stacks share
//! one pool-wide lock that is never held across a dial.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, RpcError};
use crate::transport::Connector;

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept per address (default: 4).
    pub max_idle_per_addr: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_addr: 4,
        }
    }
}

/// Statistics about the connection pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Idle connections across all addresses.
    pub total_idle: usize,
    /// Addresses with at least one idle connection.
    pub addresses: usize,
}

/// Address-keyed pool of reusable connections.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    config: PoolConfig,
    idle: RwLock<HashMap<String, Vec<C::Conn>>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates an empty pool that dials through `connector`.
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            idle: RwLock::new(HashMap::new()),
        }
    }

    /// Returns an idle connection for `addr`, or dials a new one within `timeout`.
    pub async fn acquire(&self, addr: &str, timeout: Duration) -> Result<C::Conn> {
        if let Some(conn) = self.take_idle(addr) {
            debug!(addr = addr, "reusing pooled connection");
            return Ok(conn);
        }

        match tokio::time::timeout(timeout, self.connector.connect(addr)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpcError::ConnectTimeout {
                addr: addr.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Returns a connection to the idle stack of `addr`.
    ///
    /// The connection is dropped if the stack is already full or the
    /// connector no longer considers it usable.
    pub fn release(&self, addr: &str, conn: C::Conn) {
        if !self.connector.is_usable(&conn) {
            debug!(addr = addr, "dropping unusable connection on release");
            return;
        }
        let mut idle = self.idle.write();
        let stack = idle.entry(addr.to_string()).or_default();
        if stack.len() < self.config.max_idle_per_addr {
            stack.push(conn);
        }
    }

    /// Drops every idle connection cached for `addr`.
    ///
    /// Returns the number of connections dropped.
    pub fn evict(&self, addr: &str) -> usize {
        let dropped = self.idle.write().remove(addr).map(|v| v.len()).unwrap_or(0);
        if dropped > 0 {
            debug!(addr = addr, dropped, "evicted idle connections");
        }
        dropped
    }

    /// Number of idle connections held for `addr`.
    pub fn idle_count(&self, addr: &str) -> usize {
        self.idle.read().get(addr).map(|v| v.len()).unwrap_or(0)
    }

    /// Gets pool-wide statistics.
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.read();
        PoolStats {
            total_idle: idle.values().map(|v| v.len()).sum(),
            addresses: idle.values().filter(|v| !v.is_empty()).count(),
        }
    }

    fn take_idle(&self, addr: &str) -> Option<C::Conn> {
        let mut idle = self.idle.write();
        let stack = idle.get_mut(addr)?;
        while let Some(conn) = stack.pop() {
            if self.connector.is_usable(&conn) {
                return Some(conn);
            }
            debug!(addr = addr, "discarding unusable idle connection");
        }
        None
    }
}
