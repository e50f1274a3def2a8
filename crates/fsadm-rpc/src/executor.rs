//! Fault-tolerant RPC dispatch over a set of candidate addresses.
//!
//! For each candidate in order the executor acquires a pooled connection,
//! makes up to `retry_times` attempts against that same address, and fails
//! over to the next candidate once the address is exhausted. A connection
//! that faults is dropped and redialed before the next attempt; only a
//! connection whose last call completed goes back to the pool. The first
//! successful attempt wins; remaining candidates are never contacted. When
//! every candidate fails the caller gets one error listing each address and
//! its last failure.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AddressFailure, FailureKind, Result, RpcError};
use crate::leader::{LeaderCache, LeaderProbe};
use crate::pool::ConnectionPool;
use crate::task::RpcTask;
use crate::transport::Connector;

/// Executor-wide policy.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Clear the leader cache when the cached leader fails a call (default: true).
    pub invalidate_stale_leader: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            invalidate_stale_leader: true,
        }
    }
}

struct LeaderRouting {
    cache: Arc<LeaderCache>,
    probe: Arc<dyn LeaderProbe>,
}

/// Dispatches [`RpcTask`]s with per-address retries and multi-address failover.
pub struct RpcExecutor<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
    routing: Option<LeaderRouting>,
    config: ExecutorConfig,
}

impl<C: Connector> RpcExecutor<C> {
    /// Creates an executor without leader routing.
    pub fn new(pool: Arc<ConnectionPool<C>>, config: ExecutorConfig) -> Self {
        Self {
            pool,
            routing: None,
            config,
        }
    }

    /// Enables leader-first routing through `cache`, probing with `probe` on a miss.
    pub fn with_leader_routing(
        mut self,
        cache: Arc<LeaderCache>,
        probe: Arc<dyn LeaderProbe>,
    ) -> Self {
        self.routing = Some(LeaderRouting { cache, probe });
        self
    }

    /// The connection pool this executor draws from.
    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    /// The leader cache, when leader routing is enabled.
    pub fn leader_cache(&self) -> Option<&Arc<LeaderCache>> {
        self.routing.as_ref().map(|r| &r.cache)
    }

    /// Runs `task` to completion.
    ///
    /// Blocks the calling task for dialing plus every attempt across every
    /// candidate in the worst case.
    pub async fn execute<Req, Resp, F, Fut>(&self, task: RpcTask<Req, F>) -> Result<Resp>
    where
        Req: Clone,
        F: Fn(C::Conn, Req) -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        if task.addrs.is_empty() {
            return Err(RpcError::NoCandidates { op: task.name });
        }

        let (candidates, leader) = self.candidates(&task).await;
        let options = &task.options;
        let attempts_per_addr = options.retry_times.max(1);
        let timeout_ms = options.timeout.as_millis() as u64;
        let mut failures = Vec::with_capacity(candidates.len());

        for addr in &candidates {
            let mut conn = match self.pool.acquire(addr, options.timeout).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    warn!(op = %task.name, addr = %addr, error = %e, "connect failed, trying next address");
                    self.forget_leader(leader.as_deref(), addr);
                    failures.push(AddressFailure {
                        addr: addr.clone(),
                        kind: FailureKind::Connection,
                        attempts: 0,
                        reason: e.to_string(),
                        status: None,
                    });
                    continue;
                }
            };

            let mut attempts = 0;
            let mut last_error = None;
            let mut status = None;
            for attempt in 1..=attempts_per_addr {
                if attempt > 1 {
                    if let Some(delay) = options.retry_delay {
                        tokio::time::sleep(delay).await;
                    }
                }

                // a connection fault on the previous attempt dropped the handle
                let current = match conn.take() {
                    Some(conn) => conn,
                    None => match self.pool.acquire(addr, options.timeout).await {
                        Ok(conn) => conn,
                        Err(e) => {
                            debug!(op = %task.name, addr = %addr, attempt, error = %e, "redial failed");
                            last_error = Some(e);
                            break;
                        }
                    },
                };
                attempts = attempt;

                let call = (task.op)(current.clone(), task.request.clone());
                let outcome = match tokio::time::timeout(options.timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(RpcError::CallTimeout {
                        addr: addr.clone(),
                        timeout_ms,
                    }),
                };

                match outcome {
                    Ok(response) => {
                        self.pool.release(addr, current);
                        debug!(op = %task.name, addr = %addr, attempt, "rpc succeeded");
                        return Ok(response);
                    }
                    Err(e) if e.is_connection_fault() => {
                        debug!(op = %task.name, addr = %addr, attempt, error = %e, "connection fault, dropping connection");
                        drop(current);
                        self.pool.evict(addr);
                        last_error = Some(e);
                    }
                    Err(e) => {
                        debug!(op = %task.name, addr = %addr, attempt, error = %e, "rpc attempt failed");
                        status = e.status_code().or(status);
                        conn = Some(current);
                        last_error = Some(e);
                    }
                }
            }

            if let Some(conn) = conn {
                self.pool.release(addr, conn);
            }
            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            warn!(
                op = %task.name,
                addr = %addr,
                attempts,
                error = %reason,
                "address exhausted, failing over"
            );
            self.forget_leader(leader.as_deref(), addr);
            failures.push(AddressFailure {
                addr: addr.clone(),
                kind: FailureKind::Call,
                attempts,
                reason,
                status,
            });
        }

        Err(RpcError::Exhausted {
            op: task.name,
            failures,
        })
    }

    /// Moves the leader to the front when routing is enabled and a leader is
    /// known or discoverable. The other candidates follow in caller order, so
    /// a stale leader fails over within the same call.
    async fn candidates<Req, F>(&self, task: &RpcTask<Req, F>) -> (Vec<String>, Option<String>) {
        if task.options.leader_routing {
            if let Some(routing) = &self.routing {
                if let Some(leader) = routing
                    .cache
                    .resolve_leader(&task.addrs, routing.probe.as_ref())
                    .await
                {
                    let mut ordered = Vec::with_capacity(task.addrs.len());
                    ordered.push(leader.clone());
                    ordered.extend(task.addrs.iter().filter(|a| **a != leader).cloned());
                    return (ordered, Some(leader));
                }
            }
        }
        (task.addrs.clone(), None)
    }

    fn forget_leader(&self, leader: Option<&str>, failed: &str) {
        if !self.config.invalidate_stale_leader || leader != Some(failed) {
            return;
        }
        if let Some(routing) = &self.routing {
            if routing.cache.invalidate_if(failed) {
                warn!(addr = %failed, "cached leader failed, cache cleared");
            }
        }
    }
}
