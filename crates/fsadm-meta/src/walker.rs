//! Bounded-concurrency recursive traversal of a server-resident tree.
//!
//! Each directory is listed, its children are dispatched in listing order,
//! its spawned child descents are awaited, and finally the visitor's
//! post-order action runs if nothing failed. Directory children run on a
//! fresh task when one of the `threads` slots is free and inline otherwise,
//! so the number of spawned descents never exceeds `threads` while depth is
//! unbounded.
//!
//! The first error posted anywhere stops every branch from starting new
//! work. Calls already in flight are not interrupted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::client::MetaServer;
use crate::error::WalkError;
use crate::summary::{Summary, SummarySnapshot};
use crate::types::{DirNode, RoutingKey};

/// Per-entry behaviour plugged into a [`TreeWalker`].
#[async_trait]
pub trait Visitor: Send + Sync + 'static {
    /// Called once for every file, on the task that listed its parent.
    async fn visit_file(&self, file: &DirNode, summary: &Summary) -> Result<(), WalkError>;

    /// Called for a directory after its whole subtree finished cleanly.
    async fn post_visit_dir(&self, _dir: &DirNode, _summary: &Summary) -> Result<(), WalkError> {
        Ok(())
    }
}

/// First-error-wins slot shared by every branch of a walk.
#[derive(Default)]
struct ErrorSlot {
    set: AtomicBool,
    error: Mutex<Option<WalkError>>,
}

impl ErrorSlot {
    fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    fn post(&self, error: WalkError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            warn!(error = %error, "walk failed, stopping new work");
            *slot = Some(error);
            self.set.store(true, Ordering::Release);
        } else {
            debug!(error = %error, "dropping error after the first");
        }
    }

    fn take(&self) -> Option<WalkError> {
        self.error.lock().take()
    }
}

/// State created once per [`TreeWalker::walk`] call.
struct WalkState {
    summary: Summary,
    error: ErrorSlot,
    slots: Arc<Semaphore>,
    running: AtomicU64,
    peak: AtomicU64,
}

impl WalkState {
    fn new(threads: usize) -> Self {
        Self {
            summary: Summary::new(),
            error: ErrorSlot::default(),
            slots: Arc::new(Semaphore::new(threads)),
            running: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    fn enter(self: &Arc<Self>) -> DescentGuard {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        DescentGuard {
            state: Arc::clone(self),
        }
    }
}

/// Marks one spawned descent as running until dropped.
struct DescentGuard {
    state: Arc<WalkState>,
}

impl Drop for DescentGuard {
    fn drop(&mut self) {
        self.state.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Inner<M, V> {
    meta: Arc<M>,
    visitor: V,
    route: RoutingKey,
    threads: usize,
}

/// Walks a directory tree through a [`MetaServer`], applying a [`Visitor`].
pub struct TreeWalker<M, V> {
    inner: Arc<Inner<M, V>>,
}

impl<M: MetaServer, V: Visitor> TreeWalker<M, V> {
    /// Creates a walker that runs at most `threads` spawned descents at once.
    pub fn new(meta: Arc<M>, visitor: V, route: RoutingKey, threads: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                meta,
                visitor,
                route,
                threads,
            }),
        }
    }

    /// The visitor applied to every entry.
    pub fn visitor(&self) -> &V {
        &self.inner.visitor
    }

    /// Walks the subtree under `root`, including `root`'s own post-order action.
    ///
    /// Always returns the summary accumulated so far, alongside the first
    /// error if one was posted.
    pub async fn walk(&self, root: DirNode) -> (SummarySnapshot, Result<(), WalkError>) {
        let state = Arc::new(WalkState::new(self.inner.threads));
        info!(
            inode = %root.inode,
            fs_id = %root.fs_id,
            threads = self.inner.threads,
            "walk started"
        );

        walk_dir(Arc::clone(&self.inner), Arc::clone(&state), root).await;

        let mut snapshot = state.summary.snapshot();
        snapshot.peak_descents = state.peak.load(Ordering::SeqCst);
        let result = match state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        info!(
            dirs = snapshot.dirs_visited,
            files = snapshot.files_visited,
            deleted = snapshot.inodes_deleted,
            failed = result.is_err(),
            "walk finished"
        );
        (snapshot, result)
    }
}

/// Processes one directory. Resolves to whether its subtree finished cleanly.
fn walk_dir<M: MetaServer, V: Visitor>(
    inner: Arc<Inner<M, V>>,
    state: Arc<WalkState>,
    dir: DirNode,
) -> BoxFuture<'static, bool> {
    async move {
        let children = match inner.meta.list_children(&inner.route, dir.inode).await {
            Ok(children) => children,
            Err(source) => {
                state.error.post(WalkError::List {
                    inode: dir.inode,
                    source,
                });
                return false;
            }
        };
        debug!(inode = %dir.inode, children = children.len(), "listed directory");

        let mut clean = true;
        let mut spawned = Vec::new();
        for child in children {
            if state.error.is_set() {
                clean = false;
                break;
            }

            if !child.is_dir() {
                state.summary.add_file();
                if let Err(e) = inner.visitor.visit_file(&child, &state.summary).await {
                    state.error.post(e);
                    clean = false;
                }
                continue;
            }

            state.summary.add_dir();
            match Arc::clone(&state.slots).try_acquire_owned() {
                Ok(permit) => {
                    let inner = Arc::clone(&inner);
                    let child_state = Arc::clone(&state);
                    spawned.push(tokio::spawn(async move {
                        let _permit = permit;
                        let _running = child_state.enter();
                        walk_dir(inner, child_state, child).await
                    }));
                }
                Err(_) => {
                    if !walk_dir(Arc::clone(&inner), Arc::clone(&state), child).await {
                        clean = false;
                    }
                }
            }
        }

        for handle in spawned {
            match handle.await {
                Ok(true) => {}
                Ok(false) => clean = false,
                Err(e) => {
                    state.error.post(WalkError::Aborted {
                        inode: dir.inode,
                        reason: e.to_string(),
                    });
                    clean = false;
                }
            }
        }

        if !clean || state.error.is_set() {
            return false;
        }
        if let Err(e) = inner.visitor.post_visit_dir(&dir, &state.summary).await {
            state.error.post(e);
            return false;
        }
        true
    }
    .boxed()
}
