//! Leader address cache.
//!
//! Holds at most one address: the replica last seen reporting the leader
//! role. Populated lazily by probing candidates in order; never cleared
//! except through [`LeaderCache::invalidate`] / [`LeaderCache::invalidate_if`].

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// Lightweight status query used to discover the leader.
#[async_trait]
pub trait LeaderProbe: Send + Sync {
    /// Returns whether the server at `addr` currently reports the leader role.
    async fn is_leader(&self, addr: &str) -> Result<bool>;
}

/// Cache of the currently believed leader address.
#[derive(Debug, Default)]
pub struct LeaderCache {
    leader: RwLock<Option<String>>,
    probes: AtomicU64,
}

impl LeaderCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the leader among `candidates`.
    ///
    /// A cached leader that is part of `candidates` is returned without any
    /// network traffic. Otherwise candidates are probed in order and the
    /// first one reporting the leader role is cached. Returns `None` when no
    /// candidate claims leadership; callers then treat every candidate as
    /// equally eligible.
    pub async fn resolve_leader(
        &self,
        candidates: &[String],
        probe: &dyn LeaderProbe,
    ) -> Option<String> {
        if let Some(leader) = self.cached() {
            if candidates.iter().any(|c| *c == leader) {
                debug!(leader = %leader, "leader cache hit");
                return Some(leader);
            }
        }

        for addr in candidates {
            self.probes.fetch_add(1, Ordering::Relaxed);
            match probe.is_leader(addr).await {
                Ok(true) => {
                    debug!(leader = %addr, "leader resolved");
                    *self.leader.write() = Some(addr.clone());
                    return Some(addr.clone());
                }
                Ok(false) => {}
                Err(e) => warn!(addr = %addr, error = %e, "leader probe failed"),
            }
        }
        None
    }

    /// The cached leader, if any.
    pub fn cached(&self) -> Option<String> {
        self.leader.read().clone()
    }

    /// Forgets the cached leader.
    pub fn invalidate(&self) {
        *self.leader.write() = None;
    }

    /// Forgets the cached leader only if it is `addr`.
    ///
    /// Returns whether the cache was cleared.
    pub fn invalidate_if(&self, addr: &str) -> bool {
        let mut leader = self.leader.write();
        if leader.as_deref() == Some(addr) {
            *leader = None;
            true
        } else {
            false
        }
    }

    /// Total number of status probes issued through this cache.
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }
}
