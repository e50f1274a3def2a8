use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a unique identifier for an inode within one filesystem
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId(u64);

impl InodeId {
    /// The root inode ID (always 1)
    pub const ROOT_INODE: InodeId = InodeId(1);

    /// Creates a new InodeId from a raw u64 value
    pub fn new(id: u64) -> Self {
        InodeId(id)
    }

    /// Returns the raw u64 value of this inode ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one filesystem served by the metadata cluster
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FsId(u32);

impl FsId {
    /// Creates a new FsId from a raw u32 value
    pub fn new(id: u32) -> Self {
        FsId(id)
    }

    /// Returns the raw u32 value of this filesystem ID
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing fields that select the replica group owning a request's inodes.
///
/// Passed through opaquely with every metadata call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    /// Storage pool
    pub pool_id: u32,
    /// Copyset within the pool
    pub copyset_id: u32,
    /// Partition within the copyset
    pub partition_id: u32,
    /// Filesystem
    pub fs_id: FsId,
}

/// Point in time with second and nanosecond precision
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since Unix epoch
    pub secs: u64,
    /// Nanoseconds within the second
    pub nanos: u32,
}

impl Timestamp {
    /// Returns the current timestamp
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: now.as_secs(),
            nanos: now.subsec_nanos(),
        }
    }
}

/// Entry kind as reported by a directory listing
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file (anything that is not a directory)
    File,
    /// Directory
    Directory,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => write!(f, "file"),
            FileType::Directory => write!(f, "directory"),
        }
    }
}

/// One entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirNode {
    /// Owning filesystem
    pub fs_id: FsId,
    /// Inode of this entry
    pub inode: InodeId,
    /// Inode of the directory holding the dentry
    pub parent: InodeId,
    /// Dentry name
    pub name: String,
    /// Entry kind
    pub kind: FileType,
}

impl DirNode {
    /// Directory reference for a walk that starts at `inode` without a known dentry.
    pub fn directory(fs_id: FsId, inode: InodeId) -> Self {
        Self {
            fs_id,
            inode,
            parent: inode,
            name: String::new(),
            kind: FileType::Directory,
        }
    }

    /// The filesystem root directory.
    pub fn root(fs_id: FsId) -> Self {
        Self {
            name: "/".to_string(),
            ..Self::directory(fs_id, InodeId::ROOT_INODE)
        }
    }

    /// Whether this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }
}

/// One slot of a file's chunk map
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Position of the chunk within the file
    pub index: u64,
    /// Backing storage object
    pub chunk_id: u64,
}

/// File attributes as returned by the metadata service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Inode number
    pub inode: InodeId,
    /// Entry kind
    pub kind: FileType,
    /// File length in bytes
    pub length: u64,
    /// Last modification time
    pub mtime: Timestamp,
    /// Last status change time
    pub ctime: Timestamp,
    /// Chunk map
    pub chunks: Vec<ChunkRef>,
}

/// Attributes supplied when creating an inode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInode {
    /// Entry kind
    pub kind: FileType,
    /// Initial length in bytes
    pub length: u64,
    /// Initial chunk map
    pub chunks: Vec<ChunkRef>,
}

impl NewInode {
    /// An empty directory
    pub fn directory() -> Self {
        Self {
            kind: FileType::Directory,
            length: 0,
            chunks: Vec::new(),
        }
    }

    /// A file with the given length and chunk map
    pub fn file(length: u64, chunks: Vec<ChunkRef>) -> Self {
        Self {
            kind: FileType::File,
            length,
            chunks,
        }
    }
}
