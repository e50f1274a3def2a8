//! Recursive subtree removal.
//!
//! Files lose their dentry before their inode. A directory is removed only
//! after every entry below it is gone, then its parent's timestamps are
//! refreshed. A failure leaves the failing entry and all of its ancestors in
//! place; subtrees that were already removed stay removed.
//!
//! Deletes may be applied more than once when a reply is lost and the call
//! retried, so a `NotFound` answer to a dentry or inode delete counts as done.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::client::MetaServer;
use crate::error::{DeleteStage, MetaError, WalkError};
use crate::summary::{Summary, SummarySnapshot};
use crate::types::{DirNode, InodeId, RoutingKey, Timestamp};

/// Maps a `NotFound` reply to success.
fn already_gone(
    result: Result<(), MetaError>,
    node: &DirNode,
    stage: DeleteStage,
) -> Result<(), MetaError> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!(inode = %node.inode, name = %node.name, %stage, "already removed");
            Ok(())
        }
        other => other,
    }
}
use crate::walker::{TreeWalker, Visitor};

/// Visitor that deletes every entry it sees.
pub struct SubtreeDeleter<M> {
    meta: Arc<M>,
    route: RoutingKey,
}

fn partial(node: &DirNode, stage: DeleteStage, source: MetaError) -> WalkError {
    WalkError::PartialDelete {
        inode: node.inode,
        name: node.name.clone(),
        kind: node.kind,
        stage,
        source,
    }
}

impl<M: MetaServer> SubtreeDeleter<M> {
    /// Creates a deleter mutating through `meta`.
    pub fn new(meta: Arc<M>, route: RoutingKey) -> Self {
        Self { meta, route }
    }

    /// Removes the dentry, then the inode, of `node`.
    async fn remove_entry(&self, node: &DirNode, summary: &Summary) -> Result<(), WalkError> {
        let dentry = self
            .meta
            .delete_dentry(&self.route, node.parent, &node.name, node.kind)
            .await;
        already_gone(dentry, node, DeleteStage::Dentry)
            .map_err(|e| partial(node, DeleteStage::Dentry, e))?;
        let inode = self.meta.delete_inode(&self.route, node.inode).await;
        already_gone(inode, node, DeleteStage::Inode)
            .map_err(|e| partial(node, DeleteStage::Inode, e))?;
        summary.add_inode_deleted();
        debug!(inode = %node.inode, name = %node.name, kind = %node.kind, "deleted");
        Ok(())
    }

    async fn touch_parent(&self, node: &DirNode) -> Result<(), WalkError> {
        let now = Timestamp::now();
        self.meta
            .update_timestamps(&self.route, node.parent, now, now)
            .await
            .map_err(|e| partial(node, DeleteStage::ParentTimestamps, e))
    }
}

#[async_trait]
impl<M: MetaServer> Visitor for SubtreeDeleter<M> {
    async fn visit_file(&self, file: &DirNode, summary: &Summary) -> Result<(), WalkError> {
        self.remove_entry(file, summary).await
    }

    async fn post_visit_dir(&self, dir: &DirNode, summary: &Summary) -> Result<(), WalkError> {
        self.remove_entry(dir, summary).await?;
        self.touch_parent(dir).await
    }
}

/// Deletes `target` and, for a directory, everything below it.
///
/// `target` must carry its real dentry (parent and name), as returned by
/// [`crate::path::resolve_path`] or a listing. The filesystem root is refused.
pub async fn remove_subtree<M: MetaServer>(
    meta: Arc<M>,
    route: RoutingKey,
    target: DirNode,
    threads: usize,
) -> (SummarySnapshot, Result<(), WalkError>) {
    if target.inode == InodeId::ROOT_INODE {
        return (
            SummarySnapshot::default(),
            Err(WalkError::Refused {
                inode: target.inode,
                reason: "the filesystem root cannot be deleted".to_string(),
            }),
        );
    }
    if target.name.is_empty() || target.parent == target.inode {
        return (
            SummarySnapshot::default(),
            Err(WalkError::Refused {
                inode: target.inode,
                reason: "target has no dentry; resolve it by path".to_string(),
            }),
        );
    }

    let deleter = SubtreeDeleter::new(Arc::clone(&meta), route);
    if target.is_dir() {
        return TreeWalker::new(meta, deleter, route, threads)
            .walk(target)
            .await;
    }

    let summary = Summary::new();
    summary.add_file();
    let result = match deleter.remove_entry(&target, &summary).await {
        Ok(()) => deleter.touch_parent(&target).await,
        Err(e) => Err(e),
    };
    info!(inode = %target.inode, ok = result.is_ok(), "file removal finished");
    (summary.snapshot(), result)
}
