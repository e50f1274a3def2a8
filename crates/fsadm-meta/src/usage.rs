//! Directory size and inode aggregation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::MetaServer;
use crate::error::WalkError;
use crate::summary::{Summary, SummarySnapshot};
use crate::types::{DirNode, InodeId, RoutingKey};
use crate::walker::{TreeWalker, Visitor};

/// Visitor that sums file lengths.
pub struct UsageCounter<M> {
    meta: Arc<M>,
    route: RoutingKey,
}

impl<M: MetaServer> UsageCounter<M> {
    /// Creates a counter reading attributes through `meta`.
    pub fn new(meta: Arc<M>, route: RoutingKey) -> Self {
        Self { meta, route }
    }
}

#[async_trait]
impl<M: MetaServer> Visitor for UsageCounter<M> {
    async fn visit_file(&self, file: &DirNode, summary: &Summary) -> Result<(), WalkError> {
        let attr = self
            .meta
            .get_file_attr(&self.route, file.inode)
            .await
            .map_err(|source| WalkError::Visit {
                inode: file.inode,
                name: file.name.clone(),
                source,
            })?;
        summary.add_bytes(attr.length);
        Ok(())
    }
}

/// Totals bytes and inodes under directory `root`.
///
/// The inode count is [`SummarySnapshot::inode_count`], which includes `root`.
pub async fn directory_usage<M: MetaServer>(
    meta: Arc<M>,
    route: RoutingKey,
    root: InodeId,
    threads: usize,
) -> (SummarySnapshot, Result<(), WalkError>) {
    let counter = UsageCounter::new(Arc::clone(&meta), route);
    TreeWalker::new(meta, counter, route, threads)
        .walk(DirNode::directory(route.fs_id, root))
        .await
}
