//! Typed request/response pairs exchanged with the metadata service.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{DirNode, FileAttr, FileType, InodeId, NewInode, RoutingKey, Timestamp};

/// Server-side status code carried by every response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaStatus {
    /// Request succeeded.
    Ok,
    /// Inode or dentry does not exist.
    NotFound,
    /// Dentry or inode already exists.
    Exists,
    /// Directory still has entries.
    NotEmpty,
    /// Malformed request.
    ParamError,
    /// Contacted replica is not the partition leader.
    NotLeader,
    /// Server-side storage failure.
    StorageError,
}

impl MetaStatus {
    /// Numeric code reported in errors.
    pub fn code(&self) -> i32 {
        match self {
            MetaStatus::Ok => 0,
            MetaStatus::NotFound => 1,
            MetaStatus::Exists => 2,
            MetaStatus::NotEmpty => 3,
            MetaStatus::ParamError => 4,
            MetaStatus::NotLeader => 5,
            MetaStatus::StorageError => 6,
        }
    }
}

impl fmt::Display for MetaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MetaStatus::Ok => "ok",
            MetaStatus::NotFound => "not found",
            MetaStatus::Exists => "already exists",
            MetaStatus::NotEmpty => "directory not empty",
            MetaStatus::ParamError => "invalid parameter",
            MetaStatus::NotLeader => "not leader",
            MetaStatus::StorageError => "storage error",
        };
        f.write_str(text)
    }
}

/// Requests understood by the metadata service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaRequest {
    /// Report whether the contacted replica is the leader.
    GetStatus,
    /// List the entries of a directory.
    ListDentry {
        /// Routing fields
        route: RoutingKey,
        /// Directory to list
        parent: InodeId,
    },
    /// Find one entry by name.
    Lookup {
        /// Routing fields
        route: RoutingKey,
        /// Directory to search
        parent: InodeId,
        /// Entry name
        name: String,
    },
    /// Fetch inode attributes including the chunk map.
    GetInode {
        /// Routing fields
        route: RoutingKey,
        /// Target inode
        inode: InodeId,
    },
    /// Allocate a new inode.
    CreateInode {
        /// Routing fields
        route: RoutingKey,
        /// Directory that will hold the inode
        parent: InodeId,
        /// Initial attributes
        attrs: NewInode,
    },
    /// Remove an inode record.
    DeleteInode {
        /// Routing fields
        route: RoutingKey,
        /// Target inode
        inode: InodeId,
    },
    /// Bind a name to an inode under a parent.
    CreateDentry {
        /// Routing fields
        route: RoutingKey,
        /// Parent directory
        parent: InodeId,
        /// Entry name
        name: String,
        /// Target inode
        inode: InodeId,
        /// Entry kind
        kind: FileType,
    },
    /// Remove a name from a parent directory.
    DeleteDentry {
        /// Routing fields
        route: RoutingKey,
        /// Parent directory
        parent: InodeId,
        /// Entry name
        name: String,
        /// Entry kind
        kind: FileType,
    },
    /// Set an inode's modification and change times.
    UpdateInodeTimestamps {
        /// Routing fields
        route: RoutingKey,
        /// Target inode
        inode: InodeId,
        /// New modification time
        mtime: Timestamp,
        /// New change time
        ctime: Timestamp,
    },
}

impl MetaRequest {
    /// Operation name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            MetaRequest::GetStatus => "GetStatus",
            MetaRequest::ListDentry { .. } => "ListDentry",
            MetaRequest::Lookup { .. } => "Lookup",
            MetaRequest::GetInode { .. } => "GetInode",
            MetaRequest::CreateInode { .. } => "CreateInode",
            MetaRequest::DeleteInode { .. } => "DeleteInode",
            MetaRequest::CreateDentry { .. } => "CreateDentry",
            MetaRequest::DeleteDentry { .. } => "DeleteDentry",
            MetaRequest::UpdateInodeTimestamps { .. } => "UpdateInodeTimestamps",
        }
    }
}

/// Payload of a successful response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// No payload.
    Empty,
    /// Leader role of the contacted replica.
    Leader(bool),
    /// Directory entries in listing order.
    Dentries(Vec<DirNode>),
    /// A single directory entry.
    Dentry(DirNode),
    /// Inode attributes.
    Inode(FileAttr),
    /// A newly allocated inode.
    Created(InodeId),
}

impl ResponseBody {
    /// Variant name, for unexpected-response errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::Empty => "Empty",
            ResponseBody::Leader(_) => "Leader",
            ResponseBody::Dentries(_) => "Dentries",
            ResponseBody::Dentry(_) => "Dentry",
            ResponseBody::Inode(_) => "Inode",
            ResponseBody::Created(_) => "Created",
        }
    }
}

/// Response envelope: a status plus a payload that is meaningful only on `Ok`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaResponse {
    /// Server status
    pub status: MetaStatus,
    /// Payload
    pub body: ResponseBody,
}

impl MetaResponse {
    /// A successful response.
    pub fn ok(body: ResponseBody) -> Self {
        Self {
            status: MetaStatus::Ok,
            body,
        }
    }

    /// A failed response without payload.
    pub fn error(status: MetaStatus) -> Self {
        Self {
            status,
            body: ResponseBody::Empty,
        }
    }
}
