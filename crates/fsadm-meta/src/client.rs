//! Metadata-service client.
//!
//! [`MetaServer`] is the typed boundary the walker and commands consume.
//! [`RpcMetaClient`] implements it on top of [`RpcExecutor`], so every call
//! gets per-address retries, failover and leader routing. Any connection
//! type that implements [`MetaChannel`] can carry the calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fsadm_rpc::{
    CallOptions, ConnectionPool, Connector, LeaderProbe, RpcError, RpcExecutor, RpcTask,
    TcpConnection,
};
use tracing::debug;

use crate::error::MetaError;
use crate::message::{MetaRequest, MetaResponse, MetaStatus, ResponseBody};
use crate::types::{DirNode, FileAttr, FileType, InodeId, NewInode, RoutingKey, Timestamp};

/// Result alias for metadata calls.
pub type Result<T> = std::result::Result<T, MetaError>;

/// A connection able to carry one metadata request/response pair.
#[async_trait]
pub trait MetaChannel: Send + Sync {
    /// Sends `request` and waits for its response.
    async fn call(&self, request: MetaRequest) -> fsadm_rpc::Result<MetaResponse>;
}

#[async_trait]
impl MetaChannel for Arc<TcpConnection> {
    async fn call(&self, request: MetaRequest) -> fsadm_rpc::Result<MetaResponse> {
        TcpConnection::call(self, &request).await
    }
}

/// Logical operations of the metadata service.
#[async_trait]
pub trait MetaServer: Send + Sync + 'static {
    /// Lists the entries of `parent` in server order.
    async fn list_children(&self, route: &RoutingKey, parent: InodeId) -> Result<Vec<DirNode>>;

    /// Finds the entry `name` under `parent`.
    async fn lookup(&self, route: &RoutingKey, parent: InodeId, name: &str) -> Result<DirNode>;

    /// Fetches attributes, including the chunk map, of `inode`.
    async fn get_file_attr(&self, route: &RoutingKey, inode: InodeId) -> Result<FileAttr>;

    /// Allocates a new inode under `parent`.
    async fn create_inode(
        &self,
        route: &RoutingKey,
        parent: InodeId,
        attrs: NewInode,
    ) -> Result<InodeId>;

    /// Removes the inode record.
    async fn delete_inode(&self, route: &RoutingKey, inode: InodeId) -> Result<()>;

    /// Binds `name` to `inode` under `parent`.
    async fn create_dentry(
        &self,
        route: &RoutingKey,
        parent: InodeId,
        name: &str,
        inode: InodeId,
        kind: FileType,
    ) -> Result<()>;

    /// Removes `name` from `parent`.
    async fn delete_dentry(
        &self,
        route: &RoutingKey,
        parent: InodeId,
        name: &str,
        kind: FileType,
    ) -> Result<()>;

    /// Sets the modification and change times of `inode`.
    async fn update_timestamps(
        &self,
        route: &RoutingKey,
        inode: InodeId,
        mtime: Timestamp,
        ctime: Timestamp,
    ) -> Result<()>;
}

/// Converts a non-`Ok` status into an RPC call error so the executor retries it.
fn check_status(response: MetaResponse) -> fsadm_rpc::Result<ResponseBody> {
    match response.status {
        MetaStatus::Ok => Ok(response.body),
        status => Err(RpcError::Status {
            code: status.code(),
            message: status.to_string(),
        }),
    }
}

/// [`MetaServer`] backed by retrying, failing-over RPCs.
pub struct RpcMetaClient<C: Connector> {
    executor: Arc<RpcExecutor<C>>,
    addrs: Vec<String>,
    options: CallOptions,
}

impl<C> RpcMetaClient<C>
where
    C: Connector,
    C::Conn: MetaChannel,
{
    /// Creates a client sending every call to `addrs` with `options`.
    pub fn new(executor: Arc<RpcExecutor<C>>, addrs: Vec<String>, options: CallOptions) -> Self {
        Self {
            executor,
            addrs,
            options,
        }
    }

    /// The executor shared by every call.
    pub fn executor(&self) -> &Arc<RpcExecutor<C>> {
        &self.executor
    }

    async fn call(&self, request: MetaRequest) -> Result<ResponseBody> {
        let op = request.name();
        let task = RpcTask::new(
            op,
            self.addrs.clone(),
            request,
            |conn: C::Conn, request: MetaRequest| async move {
                check_status(conn.call(request).await?)
            },
        )
        .with_options(self.options.clone());
        Ok(self.executor.execute(task).await?)
    }
}

fn unexpected(op: &'static str, body: ResponseBody) -> MetaError {
    MetaError::UnexpectedResponse {
        op,
        got: body.kind(),
    }
}

#[async_trait]
impl<C> MetaServer for RpcMetaClient<C>
where
    C: Connector,
    C::Conn: MetaChannel,
{
    async fn list_children(&self, route: &RoutingKey, parent: InodeId) -> Result<Vec<DirNode>> {
        match self
            .call(MetaRequest::ListDentry {
                route: *route,
                parent,
            })
            .await?
        {
            ResponseBody::Dentries(entries) => Ok(entries),
            other => Err(unexpected("ListDentry", other)),
        }
    }

    async fn lookup(&self, route: &RoutingKey, parent: InodeId, name: &str) -> Result<DirNode> {
        match self
            .call(MetaRequest::Lookup {
                route: *route,
                parent,
                name: name.to_string(),
            })
            .await?
        {
            ResponseBody::Dentry(entry) => Ok(entry),
            other => Err(unexpected("Lookup", other)),
        }
    }

    async fn get_file_attr(&self, route: &RoutingKey, inode: InodeId) -> Result<FileAttr> {
        match self
            .call(MetaRequest::GetInode {
                route: *route,
                inode,
            })
            .await?
        {
            ResponseBody::Inode(attr) => Ok(attr),
            other => Err(unexpected("GetInode", other)),
        }
    }

    async fn create_inode(
        &self,
        route: &RoutingKey,
        parent: InodeId,
        attrs: NewInode,
    ) -> Result<InodeId> {
        match self
            .call(MetaRequest::CreateInode {
                route: *route,
                parent,
                attrs,
            })
            .await?
        {
            ResponseBody::Created(inode) => Ok(inode),
            other => Err(unexpected("CreateInode", other)),
        }
    }

    async fn delete_inode(&self, route: &RoutingKey, inode: InodeId) -> Result<()> {
        self.call(MetaRequest::DeleteInode {
            route: *route,
            inode,
        })
        .await?;
        Ok(())
    }

    async fn create_dentry(
        &self,
        route: &RoutingKey,
        parent: InodeId,
        name: &str,
        inode: InodeId,
        kind: FileType,
    ) -> Result<()> {
        self.call(MetaRequest::CreateDentry {
            route: *route,
            parent,
            name: name.to_string(),
            inode,
            kind,
        })
        .await?;
        Ok(())
    }

    async fn delete_dentry(
        &self,
        route: &RoutingKey,
        parent: InodeId,
        name: &str,
        kind: FileType,
    ) -> Result<()> {
        self.call(MetaRequest::DeleteDentry {
            route: *route,
            parent,
            name: name.to_string(),
            kind,
        })
        .await?;
        Ok(())
    }

    async fn update_timestamps(
        &self,
        route: &RoutingKey,
        inode: InodeId,
        mtime: Timestamp,
        ctime: Timestamp,
    ) -> Result<()> {
        self.call(MetaRequest::UpdateInodeTimestamps {
            route: *route,
            inode,
            mtime,
            ctime,
        })
        .await?;
        Ok(())
    }
}

/// Leader probe that sends `GetStatus` over a pooled connection.
pub struct StatusProbe<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl<C: Connector> StatusProbe<C> {
    /// Creates a probe sharing `pool` with the executor. `connect_timeout`
    /// bounds the dial, `call_timeout` the `GetStatus` round trip.
    pub fn new(
        pool: Arc<ConnectionPool<C>>,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            connect_timeout,
            call_timeout,
        }
    }
}

#[async_trait]
impl<C> LeaderProbe for StatusProbe<C>
where
    C: Connector,
    C::Conn: MetaChannel,
{
    async fn is_leader(&self, addr: &str) -> fsadm_rpc::Result<bool> {
        let conn = self.pool.acquire(addr, self.connect_timeout).await?;
        let status = conn.call(MetaRequest::GetStatus);
        let outcome = match tokio::time::timeout(self.call_timeout, status).await {
            Ok(result) => result.and_then(check_status),
            Err(_) => Err(RpcError::CallTimeout {
                addr: addr.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        };
        match outcome {
            Ok(ResponseBody::Leader(is_leader)) => {
                self.pool.release(addr, conn);
                debug!(addr = addr, is_leader, "status probe");
                Ok(is_leader)
            }
            Ok(other) => {
                self.pool.release(addr, conn);
                Err(RpcError::Call {
                    addr: addr.to_string(),
                    reason: format!("GetStatus: unexpected response {}", other.kind()),
                })
            }
            Err(e) => {
                if e.is_connection_fault() {
                    drop(conn);
                    self.pool.evict(addr);
                } else {
                    self.pool.release(addr, conn);
                }
                Err(e)
            }
        }
    }
}
