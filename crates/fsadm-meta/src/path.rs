//! Absolute path to dentry resolution.

use crate::client::{MetaServer, Result};
use crate::error::MetaError;
use crate::types::{DirNode, RoutingKey};

/// Splits an absolute path into its components.
///
/// Empty components are skipped; `.` and `..` are rejected.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(MetaError::InvalidPath(path.to_string()));
    }
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.iter().any(|c| *c == "." || *c == "..") {
        return Err(MetaError::InvalidPath(path.to_string()));
    }
    Ok(components)
}

/// Resolves `path` one lookup per component, starting at the filesystem root.
///
/// `"/"` resolves to the root itself.
pub async fn resolve_path<M: MetaServer + ?Sized>(
    meta: &M,
    route: &RoutingKey,
    path: &str,
) -> Result<DirNode> {
    let mut current = DirNode::root(route.fs_id);
    for component in split_path(path)? {
        if !current.is_dir() {
            return Err(MetaError::NotADirectory {
                path: path.to_string(),
                component: current.name,
            });
        }
        current = meta.lookup(route, current.inode, component).await?;
    }
    Ok(current)
}
