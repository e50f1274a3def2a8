//! Aggregate results of one traversal.
//!
//! Counters are atomics bumped from any worker; diagnostic lines sit behind
//! a mutex. Values are only meaningful once the walk that owns the summary
//! has returned.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// Shared, concurrently updated traversal results.
#[derive(Debug, Default)]
pub struct Summary {
    dirs_visited: AtomicU64,
    files_visited: AtomicU64,
    chunks_visited: AtomicU64,
    error_chunks: AtomicU64,
    inodes_deleted: AtomicU64,
    total_bytes: AtomicU64,
    failed_files: AtomicU64,
    diagnostics: Mutex<Vec<String>>,
}

impl Summary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one directory below the walk root.
    pub fn add_dir(&self) {
        self.dirs_visited.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one file.
    pub fn add_file(&self) {
        self.files_visited.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts inspected chunk-map entries.
    pub fn add_chunks(&self, count: u64) {
        self.chunks_visited.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one duplicated chunk id together with its report line.
    pub fn add_error_chunk(&self, line: String) {
        self.error_chunks.fetch_add(1, Ordering::Relaxed);
        self.diagnostics.lock().push(line);
    }

    /// Counts one deleted inode.
    pub fn add_inode_deleted(&self) {
        self.inodes_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds file bytes to the usage total.
    pub fn add_bytes(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Counts a file whose inspection failed but did not abort the walk.
    pub fn add_failed_file(&self) {
        self.failed_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Appends a free-form diagnostic line.
    pub fn push_diagnostic(&self, line: String) {
        self.diagnostics.lock().push(line);
    }

    /// Copies the current values out.
    pub fn snapshot(&self) -> SummarySnapshot {
        SummarySnapshot {
            dirs_visited: self.dirs_visited.load(Ordering::Relaxed),
            files_visited: self.files_visited.load(Ordering::Relaxed),
            chunks_visited: self.chunks_visited.load(Ordering::Relaxed),
            error_chunks: self.error_chunks.load(Ordering::Relaxed),
            inodes_deleted: self.inodes_deleted.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            failed_files: self.failed_files.load(Ordering::Relaxed),
            peak_descents: 0,
            diagnostics: self.diagnostics.lock().clone(),
        }
    }
}

/// Plain copy of a [`Summary`], ready for table or JSON rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummarySnapshot {
    /// Directories below the walk root
    pub dirs_visited: u64,
    /// Files
    pub files_visited: u64,
    /// Chunk-map entries inspected
    pub chunks_visited: u64,
    /// Chunk ids found at more than one index
    pub error_chunks: u64,
    /// Inodes removed
    pub inodes_deleted: u64,
    /// Sum of file lengths
    pub total_bytes: u64,
    /// Files whose inspection failed without aborting the walk
    pub failed_files: u64,
    /// Most subtree workers observed running at once
    pub peak_descents: u64,
    /// Human-readable report lines
    pub diagnostics: Vec<String>,
}

impl SummarySnapshot {
    /// Entries reachable from the root, excluding the root itself.
    pub fn entries_visited(&self) -> u64 {
        self.dirs_visited + self.files_visited
    }

    /// Inodes in the walked tree, including the root.
    pub fn inode_count(&self) -> u64 {
        self.entries_visited() + 1
    }
}
