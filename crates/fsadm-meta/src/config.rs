//! Tool configuration and client wiring.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fsadm_rpc::{
    CallOptions, ConnectionPool, ExecutorConfig, LeaderCache, PoolConfig, RpcExecutor,
    TcpConnector, TcpConnectorConfig,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{RpcMetaClient, StatusProbe};
use crate::types::{FsId, RoutingKey};

/// Settings shared by every command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Metadata server candidates in preference order
    pub mds_addrs: Vec<String>,
    /// Filesystem to operate on
    pub fs_id: u32,
    /// Routing: storage pool
    pub pool_id: u32,
    /// Routing: copyset
    pub copyset_id: u32,
    /// Routing: partition
    pub partition_id: u32,
    /// Per-attempt RPC timeout
    pub rpc_timeout_ms: u64,
    /// Attempts per address before failing over
    pub rpc_retry_times: u32,
    /// Pause between attempts; 0 disables it
    pub rpc_retry_delay_ms: u64,
    /// Dial timeout
    pub connect_timeout_ms: u64,
    /// Concurrent subtree workers
    pub threads: usize,
    /// Idle connections kept per address
    pub max_idle_per_addr: usize,
    /// Forget the cached leader once it fails
    pub invalidate_stale_leader: bool,
    /// Send calls to the leader only, when one is known
    pub use_leader_routing: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            mds_addrs: Vec::new(),
            fs_id: 0,
            pool_id: 0,
            copyset_id: 0,
            partition_id: 0,
            rpc_timeout_ms: 10_000,
            rpc_retry_times: 3,
            rpc_retry_delay_ms: 0,
            connect_timeout_ms: 3_000,
            threads: 8,
            max_idle_per_addr: 4,
            invalidate_stale_leader: true,
            use_leader_routing: true,
        }
    }
}

impl ToolConfig {
    /// Loads a `.toml` or `.json` file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ToolConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no command can run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mds_addrs.is_empty() {
            anyhow::bail!("mds_addrs must list at least one address");
        }
        if let Some(addr) = self.mds_addrs.iter().find(|a| a.trim().is_empty()) {
            anyhow::bail!("mds_addrs contains an empty address: {:?}", addr);
        }
        if self.threads == 0 {
            anyhow::bail!("threads must be at least 1");
        }
        if self.rpc_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            anyhow::bail!("timeouts must be non-zero");
        }
        Ok(())
    }

    /// Routing fields passed with every metadata call.
    pub fn route(&self) -> RoutingKey {
        RoutingKey {
            pool_id: self.pool_id,
            copyset_id: self.copyset_id,
            partition_id: self.partition_id,
            fs_id: FsId::new(self.fs_id),
        }
    }

    /// Retry and routing policy for each call.
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            timeout: Duration::from_millis(self.rpc_timeout_ms),
            retry_times: self.rpc_retry_times,
            retry_delay: (self.rpc_retry_delay_ms > 0)
                .then(|| Duration::from_millis(self.rpc_retry_delay_ms)),
            leader_routing: self.use_leader_routing,
        }
    }

    /// Builds a fresh pool, leader cache, executor and client over TCP.
    ///
    /// Nothing is shared with clients built by earlier calls.
    pub fn connect(&self) -> anyhow::Result<RpcMetaClient<TcpConnector>> {
        self.validate()?;

        let pool = Arc::new(ConnectionPool::new(
            TcpConnector::new(TcpConnectorConfig::default()),
            PoolConfig {
                max_idle_per_addr: self.max_idle_per_addr,
            },
        ));
        let mut executor = RpcExecutor::new(
            Arc::clone(&pool),
            ExecutorConfig {
                invalidate_stale_leader: self.invalidate_stale_leader,
            },
        );
        if self.use_leader_routing {
            let probe = StatusProbe::new(
                Arc::clone(&pool),
                Duration::from_millis(self.connect_timeout_ms),
                Duration::from_millis(self.rpc_timeout_ms),
            );
            executor = executor.with_leader_routing(Arc::new(LeaderCache::new()), Arc::new(probe));
        }

        info!(
            addrs = ?self.mds_addrs,
            fs_id = self.fs_id,
            leader_routing = self.use_leader_routing,
            "metadata client configured"
        );
        Ok(RpcMetaClient::new(
            Arc::new(executor),
            self.mds_addrs.clone(),
            self.call_options(),
        ))
    }
}
