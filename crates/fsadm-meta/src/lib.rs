#![warn(missing_docs)]

//! fsadm metadata tooling: typed metadata-service client, bounded-concurrency
//! tree walker, and the chunk check, subtree delete and usage commands built on it.

pub mod client;
pub mod config;
pub mod delete;
pub mod error;
pub mod message;
pub mod path;
pub mod scan;
pub mod summary;
pub mod types;
pub mod usage;
pub mod walker;

pub use client::{MetaChannel, MetaServer, RpcMetaClient, StatusProbe};
pub use config::ToolConfig;
pub use delete::{remove_subtree, SubtreeDeleter};
pub use error::{DeleteStage, MetaError, WalkError};
pub use message::{MetaRequest, MetaResponse, MetaStatus, ResponseBody};
pub use path::resolve_path;
pub use scan::{check_chunks, ChunkScanner};
pub use summary::{Summary, SummarySnapshot};
pub use types::{
    ChunkRef, DirNode, FileAttr, FileType, FsId, InodeId, NewInode, RoutingKey, Timestamp,
};
pub use usage::{directory_usage, UsageCounter};
pub use walker::{TreeWalker, Visitor};
