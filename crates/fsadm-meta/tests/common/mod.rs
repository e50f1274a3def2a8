//! Common test utilities: an in-memory metadata service with fault
//! injection, and an in-memory transport that serves it at fake addresses.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use fsadm_meta::{
    DirNode, FileAttr, FileType, FsId, InodeId, MetaChannel, MetaRequest, MetaResponse,
    MetaStatus, NewInode, ResponseBody, RoutingKey, RpcMetaClient, StatusProbe, Timestamp,
};
use fsadm_rpc::{
    CallOptions, ConnectionPool, Connector, ExecutorConfig, LeaderCache, PoolConfig, RpcError,
    RpcExecutor,
};
use parking_lot::Mutex;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const FS: u32 = 1;

pub fn route() -> RoutingKey {
    RoutingKey {
        pool_id: 1,
        copyset_id: 1,
        partition_id: 1,
        fs_id: FsId::new(FS),
    }
}

#[derive(Default)]
struct Tree {
    inodes: HashMap<InodeId, FileAttr>,
    children: HashMap<InodeId, Vec<DirNode>>,
}

#[derive(Default)]
struct Faults {
    fail_list: HashSet<InodeId>,
    fail_delete_inode: HashSet<InodeId>,
    list_delay: HashMap<InodeId, Duration>,
}

/// Single-partition metadata service kept in memory.
pub struct MemoryMds {
    tree: Mutex<Tree>,
    faults: Mutex<Faults>,
    next_inode: AtomicU64,
    calls: Mutex<HashMap<&'static str, u64>>,
}

impl MemoryMds {
    /// Creates a service holding only the root directory.
    pub fn new() -> Arc<Self> {
        let mut tree = Tree::default();
        tree.inodes.insert(
            InodeId::ROOT_INODE,
            FileAttr {
                inode: InodeId::ROOT_INODE,
                kind: FileType::Directory,
                length: 0,
                mtime: Timestamp::default(),
                ctime: Timestamp::default(),
                chunks: Vec::new(),
            },
        );
        tree.children.insert(InodeId::ROOT_INODE, Vec::new());
        Arc::new(Self {
            tree: Mutex::new(tree),
            faults: Mutex::new(Faults::default()),
            next_inode: AtomicU64::new(1000),
            calls: Mutex::new(HashMap::new()),
        })
    }

    /// Inserts an entry with a chosen inode number, bypassing RPC.
    pub fn add(&self, parent: u64, inode: u64, name: &str, attrs: NewInode) {
        let parent = InodeId::new(parent);
        let inode = InodeId::new(inode);
        let mut tree = self.tree.lock();
        tree.inodes.insert(
            inode,
            FileAttr {
                inode,
                kind: attrs.kind,
                length: attrs.length,
                mtime: Timestamp::default(),
                ctime: Timestamp::default(),
                chunks: attrs.chunks,
            },
        );
        if attrs.kind == FileType::Directory {
            tree.children.entry(inode).or_default();
        }
        tree.children.entry(parent).or_default().push(DirNode {
            fs_id: FsId::new(FS),
            inode,
            parent,
            name: name.to_string(),
            kind: attrs.kind,
        });
    }

    pub fn fail_list(&self, inode: u64) {
        self.faults.lock().fail_list.insert(InodeId::new(inode));
    }

    pub fn fail_delete_inode(&self, inode: u64) {
        self.faults
            .lock()
            .fail_delete_inode
            .insert(InodeId::new(inode));
    }

    pub fn delay_list(&self, inode: u64, delay: Duration) {
        self.faults
            .lock()
            .list_delay
            .insert(InodeId::new(inode), delay);
    }

    /// Removes the inode record but leaves any dentry naming it.
    pub fn drop_inode(&self, inode: u64) {
        self.tree.lock().inodes.remove(&InodeId::new(inode));
    }

    pub fn exists(&self, inode: u64) -> bool {
        self.tree.lock().inodes.contains_key(&InodeId::new(inode))
    }

    pub fn has_dentry(&self, parent: u64, name: &str) -> bool {
        self.tree
            .lock()
            .children
            .get(&InodeId::new(parent))
            .is_some_and(|c| c.iter().any(|d| d.name == name))
    }

    pub fn inode_count(&self) -> usize {
        self.tree.lock().inodes.len()
    }

    pub fn attr(&self, inode: u64) -> Option<FileAttr> {
        self.tree.lock().inodes.get(&InodeId::new(inode)).cloned()
    }

    /// Number of requests named `op` handled so far.
    pub fn calls(&self, op: &str) -> u64 {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub async fn handle(&self, request: MetaRequest) -> MetaResponse {
        *self.calls.lock().entry(request.name()).or_default() += 1;

        if let MetaRequest::ListDentry { parent, .. } = &request {
            let delay = self.faults.lock().list_delay.get(parent).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        let faults = self.faults.lock();
        let mut tree = self.tree.lock();
        match request {
            MetaRequest::GetStatus => MetaResponse::ok(ResponseBody::Leader(true)),
            MetaRequest::ListDentry { parent, .. } => {
                if faults.fail_list.contains(&parent) {
                    return MetaResponse::error(MetaStatus::StorageError);
                }
                match tree.children.get(&parent) {
                    Some(children) => MetaResponse::ok(ResponseBody::Dentries(children.clone())),
                    None => MetaResponse::error(MetaStatus::NotFound),
                }
            }
            MetaRequest::Lookup { parent, name, .. } => {
                match tree
                    .children
                    .get(&parent)
                    .and_then(|c| c.iter().find(|d| d.name == name))
                {
                    Some(entry) => MetaResponse::ok(ResponseBody::Dentry(entry.clone())),
                    None => MetaResponse::error(MetaStatus::NotFound),
                }
            }
            MetaRequest::GetInode { inode, .. } => match tree.inodes.get(&inode) {
                Some(attr) => MetaResponse::ok(ResponseBody::Inode(attr.clone())),
                None => MetaResponse::error(MetaStatus::NotFound),
            },
            MetaRequest::CreateInode { parent, attrs, .. } => {
                if !tree.children.contains_key(&parent) {
                    return MetaResponse::error(MetaStatus::NotFound);
                }
                let inode = InodeId::new(self.next_inode.fetch_add(1, Ordering::Relaxed));
                let now = Timestamp::now();
                if attrs.kind == FileType::Directory {
                    tree.children.insert(inode, Vec::new());
                }
                tree.inodes.insert(
                    inode,
                    FileAttr {
                        inode,
                        kind: attrs.kind,
                        length: attrs.length,
                        mtime: now,
                        ctime: now,
                        chunks: attrs.chunks,
                    },
                );
                MetaResponse::ok(ResponseBody::Created(inode))
            }
            MetaRequest::DeleteInode { inode, .. } => {
                if faults.fail_delete_inode.contains(&inode) {
                    return MetaResponse::error(MetaStatus::StorageError);
                }
                if tree.children.get(&inode).is_some_and(|c| !c.is_empty()) {
                    return MetaResponse::error(MetaStatus::NotEmpty);
                }
                match tree.inodes.remove(&inode) {
                    Some(_) => {
                        tree.children.remove(&inode);
                        MetaResponse::ok(ResponseBody::Empty)
                    }
                    None => MetaResponse::error(MetaStatus::NotFound),
                }
            }
            MetaRequest::CreateDentry {
                parent,
                name,
                inode,
                kind,
                ..
            } => match tree.children.get_mut(&parent) {
                Some(children) if children.iter().any(|d| d.name == name) => {
                    MetaResponse::error(MetaStatus::Exists)
                }
                Some(children) => {
                    children.push(DirNode {
                        fs_id: FsId::new(FS),
                        inode,
                        parent,
                        name,
                        kind,
                    });
                    MetaResponse::ok(ResponseBody::Empty)
                }
                None => MetaResponse::error(MetaStatus::NotFound),
            },
            MetaRequest::DeleteDentry { parent, name, .. } => {
                let Some(children) = tree.children.get_mut(&parent) else {
                    return MetaResponse::error(MetaStatus::NotFound);
                };
                match children.iter().position(|d| d.name == name) {
                    Some(pos) => {
                        children.remove(pos);
                        MetaResponse::ok(ResponseBody::Empty)
                    }
                    None => MetaResponse::error(MetaStatus::NotFound),
                }
            }
            MetaRequest::UpdateInodeTimestamps {
                inode, mtime, ctime, ..
            } => match tree.inodes.get_mut(&inode) {
                Some(attr) => {
                    attr.mtime = mtime;
                    attr.ctime = ctime;
                    MetaResponse::ok(ResponseBody::Empty)
                }
                None => MetaResponse::error(MetaStatus::NotFound),
            },
        }
    }
}

/// Set of fake addresses all backed by one [`MemoryMds`].
pub struct MemCluster {
    pub mds: Arc<MemoryMds>,
    down: Mutex<HashSet<String>>,
    leader: Mutex<Option<String>>,
    dials: AtomicU64,
    lost_replies: Mutex<HashMap<&'static str, u32>>,
}

impl MemCluster {
    pub fn new(mds: Arc<MemoryMds>) -> Arc<Self> {
        Arc::new(Self {
            mds,
            down: Mutex::new(HashSet::new()),
            leader: Mutex::new(None),
            dials: AtomicU64::new(0),
            lost_replies: Mutex::new(HashMap::new()),
        })
    }

    /// Applies the next `count` requests named `op` but fails their replies.
    pub fn lose_replies(&self, op: &'static str, count: u32) {
        self.lost_replies.lock().insert(op, count);
    }

    fn reply_lost(&self, op: &'static str) -> bool {
        match self.lost_replies.lock().get_mut(op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    /// Makes `addr` refuse dials and fail calls.
    pub fn set_down(&self, addr: &str) {
        self.down.lock().insert(addr.to_string());
    }

    pub fn set_leader(&self, addr: &str) {
        *self.leader.lock() = Some(addr.to_string());
    }

    pub fn dials(&self) -> u64 {
        self.dials.load(Ordering::Relaxed)
    }

    fn is_down(&self, addr: &str) -> bool {
        self.down.lock().contains(addr)
    }
}

#[derive(Clone)]
pub struct MemConnector {
    cluster: Arc<MemCluster>,
}

impl MemConnector {
    pub fn new(cluster: Arc<MemCluster>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Connector for MemConnector {
    type Conn = MemConn;

    async fn connect(&self, addr: &str) -> fsadm_rpc::Result<MemConn> {
        self.cluster.dials.fetch_add(1, Ordering::Relaxed);
        if self.cluster.is_down(addr) {
            return Err(RpcError::Connection {
                addr: addr.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(MemConn {
            cluster: Arc::clone(&self.cluster),
            addr: addr.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct MemConn {
    cluster: Arc<MemCluster>,
    addr: String,
}

#[async_trait]
impl MetaChannel for MemConn {
    async fn call(&self, request: MetaRequest) -> fsadm_rpc::Result<MetaResponse> {
        tokio::task::yield_now().await;
        if self.cluster.is_down(&self.addr) {
            return Err(RpcError::Connection {
                addr: self.addr.clone(),
                reason: "connection reset".to_string(),
            });
        }
        if let MetaRequest::GetStatus = request {
            let leader = self.cluster.leader.lock().clone();
            return Ok(MetaResponse::ok(ResponseBody::Leader(
                leader.as_deref() == Some(self.addr.as_str()),
            )));
        }
        let op = request.name();
        let response = self.cluster.mds.handle(request).await;
        if self.cluster.reply_lost(op) {
            return Err(RpcError::Call {
                addr: self.addr.clone(),
                reason: "reply lost".to_string(),
            });
        }
        Ok(response)
    }
}

/// Builds a client over `cluster` without leader routing.
pub fn client(cluster: &Arc<MemCluster>, addrs: &[&str]) -> Arc<RpcMetaClient<MemConnector>> {
    let pool = Arc::new(ConnectionPool::new(
        MemConnector::new(Arc::clone(cluster)),
        PoolConfig::default(),
    ));
    let executor = Arc::new(RpcExecutor::new(pool, ExecutorConfig::default()));
    Arc::new(RpcMetaClient::new(
        executor,
        addrs.iter().map(|a| a.to_string()).collect(),
        CallOptions {
            timeout: Duration::from_secs(5),
            leader_routing: false,
            ..CallOptions::default()
        },
    ))
}

/// Builds a client over `cluster` that sends calls to the leader first.
pub fn routed_client(
    cluster: &Arc<MemCluster>,
    addrs: &[&str],
) -> (Arc<RpcMetaClient<MemConnector>>, Arc<LeaderCache>) {
    let pool = Arc::new(ConnectionPool::new(
        MemConnector::new(Arc::clone(cluster)),
        PoolConfig::default(),
    ));
    let cache = Arc::new(LeaderCache::new());
    let probe = StatusProbe::new(
        Arc::clone(&pool),
        Duration::from_secs(1),
        Duration::from_secs(5),
    );
    let executor = RpcExecutor::new(pool, ExecutorConfig::default())
        .with_leader_routing(Arc::clone(&cache), Arc::new(probe));
    let client = RpcMetaClient::new(
        Arc::new(executor),
        addrs.iter().map(|a| a.to_string()).collect(),
        CallOptions {
            timeout: Duration::from_secs(5),
            ..CallOptions::default()
        },
    );
    (Arc::new(client), cache)
}

/// The tree used by the chunk-check scenario:
///
/// ```text
/// / (1)
/// ├── a   file 10, chunks {0: 5}
/// └── b   dir 11
///     └── c   file 12, chunks {0: 7, 1: 7}
/// ```
pub fn scenario_tree() -> Arc<MemoryMds> {
    use fsadm_meta::ChunkRef;

    let mds = MemoryMds::new();
    mds.add(
        1,
        10,
        "a",
        NewInode::file(4096, vec![ChunkRef { index: 0, chunk_id: 5 }]),
    );
    mds.add(1, 11, "b", NewInode::directory());
    mds.add(
        11,
        12,
        "c",
        NewInode::file(
            8192,
            vec![
                ChunkRef { index: 0, chunk_id: 7 },
                ChunkRef { index: 1, chunk_id: 7 },
            ],
        ),
    );
    mds
}
