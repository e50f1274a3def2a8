//! Error types for metadata calls and tree traversals.

use fsadm_rpc::RpcError;
use std::fmt;
use thiserror::Error;

use crate::message::MetaStatus;
use crate::types::{FileType, InodeId};

/// Errors returned by [`crate::client::MetaServer`] operations.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The RPC layer gave up after retries and failover.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The server answered with a payload that does not match the request.
    #[error("{op}: unexpected response {got}")]
    UnexpectedResponse {
        /// Operation name
        op: &'static str,
        /// Payload variant received
        got: &'static str,
    },

    /// A path could not be parsed.
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    /// A non-final path component is not a directory.
    #[error("'{component}' in '{path}' is not a directory")]
    NotADirectory {
        /// Full path being resolved
        path: String,
        /// Offending component
        component: String,
    },
}

impl MetaError {
    /// Whether the service reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            MetaError::Rpc(e) => e.status_code() == Some(MetaStatus::NotFound.code()),
            _ => false,
        }
    }
}

/// Which step of a delete was running when it failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeleteStage {
    /// Removing the name from the parent directory.
    Dentry,
    /// Removing the inode record.
    Inode,
    /// Refreshing the parent directory's mtime/ctime.
    ParentTimestamps,
}

impl fmt::Display for DeleteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteStage::Dentry => write!(f, "delete dentry"),
            DeleteStage::Inode => write!(f, "delete inode"),
            DeleteStage::ParentTimestamps => write!(f, "update parent timestamps"),
        }
    }
}

/// First failure observed during a walk. Terminal for that walk.
#[derive(Debug, Error)]
pub enum WalkError {
    /// Listing a directory failed.
    #[error("list directory {inode}: {source}")]
    List {
        /// Directory being listed
        inode: InodeId,
        /// Underlying failure
        source: MetaError,
    },

    /// A file visitor failed.
    #[error("visit file {inode} ('{name}'): {source}")]
    Visit {
        /// File inode
        inode: InodeId,
        /// Dentry name
        name: String,
        /// Underlying failure
        source: MetaError,
    },

    /// A delete failed part-way. Ancestors of `inode` are intact; subtrees
    /// deleted before the failure stay deleted.
    #[error("{stage} for {kind} {inode} ('{name}'): {source}")]
    PartialDelete {
        /// Entry being deleted
        inode: InodeId,
        /// Dentry name
        name: String,
        /// Entry kind
        kind: FileType,
        /// Step that failed
        stage: DeleteStage,
        /// Underlying failure
        source: MetaError,
    },

    /// The walk refused to start.
    #[error("refusing to walk {inode}: {reason}")]
    Refused {
        /// Requested root
        inode: InodeId,
        /// Why the request was rejected
        reason: String,
    },

    /// A worker task died before reporting.
    #[error("worker under directory {inode} aborted: {reason}")]
    Aborted {
        /// Directory whose child task died
        inode: InodeId,
        /// Join error
        reason: String,
    },
}

impl WalkError {
    /// Whether this is a partially applied delete.
    pub fn is_partial_delete(&self) -> bool {
        matches!(self, WalkError::PartialDelete { .. })
    }
}
