//! Read-only chunk consistency check.
//!
//! A chunk id must back exactly one position of a file. Every chunk id that
//! appears at more than one chunk index counts as one error chunk and gets
//! one report line listing all of its indexes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::client::MetaServer;
use crate::error::WalkError;
use crate::summary::{Summary, SummarySnapshot};
use crate::types::{ChunkRef, DirNode, InodeId, RoutingKey};
use crate::walker::{TreeWalker, Visitor};

/// Groups `chunks` by chunk id and returns the ids seen at several indexes,
/// with their sorted distinct indexes.
pub fn duplicate_chunks(chunks: &[ChunkRef]) -> Vec<(u64, Vec<u64>)> {
    let mut by_id: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    for chunk in chunks {
        by_id.entry(chunk.chunk_id).or_default().insert(chunk.index);
    }
    by_id
        .into_iter()
        .filter(|(_, indexes)| indexes.len() > 1)
        .map(|(id, indexes)| (id, indexes.into_iter().collect()))
        .collect()
}

/// Visitor that inspects each file's chunk map.
pub struct ChunkScanner<M> {
    meta: Arc<M>,
    route: RoutingKey,
}

impl<M: MetaServer> ChunkScanner<M> {
    /// Creates a scanner reading attributes through `meta`.
    pub fn new(meta: Arc<M>, route: RoutingKey) -> Self {
        Self { meta, route }
    }
}

#[async_trait]
impl<M: MetaServer> Visitor for ChunkScanner<M> {
    async fn visit_file(&self, file: &DirNode, summary: &Summary) -> Result<(), WalkError> {
        // per-file failures are tolerated; only listing failures abort the scan
        let attr = match self.meta.get_file_attr(&self.route, file.inode).await {
            Ok(attr) => attr,
            Err(e) => {
                warn!(inode = %file.inode, name = %file.name, error = %e, "cannot read chunk map");
                summary.add_failed_file();
                summary.push_diagnostic(format!("inode {}: cannot read chunk map: {}", file.inode, e));
                return Ok(());
            }
        };

        summary.add_chunks(attr.chunks.len() as u64);
        for (chunk_id, indexes) in duplicate_chunks(&attr.chunks) {
            warn!(inode = %file.inode, chunk_id, ?indexes, "duplicate chunk id");
            summary.add_error_chunk(format!(
                "inode {}: chunk id {} appears at chunk indexes {:?}",
                file.inode, chunk_id, indexes
            ));
        }
        Ok(())
    }
}

/// Scans every file under directory `root` for duplicated chunk ids.
pub async fn check_chunks<M: MetaServer>(
    meta: Arc<M>,
    route: RoutingKey,
    root: InodeId,
    threads: usize,
) -> (SummarySnapshot, Result<(), WalkError>) {
    let scanner = ChunkScanner::new(Arc::clone(&meta), route);
    TreeWalker::new(meta, scanner, route, threads)
        .walk(DirNode::directory(route.fs_id, root))
        .await
}
