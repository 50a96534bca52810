//! Virtual filesystem interface.
//!
//! The interpreter never touches the host filesystem; everything goes
//! through this async trait. The crate ships an in-memory implementation
//! (`MemFs`) used by the sandbox and the tests; hosts may provide their own.

pub mod mem;

pub use mem::MemFs;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {operation} '{path}'")]
    NotFound { path: String, operation: String },

    #[error("EEXIST: file already exists, {operation} '{path}'")]
    AlreadyExists { path: String, operation: String },

    #[error("EISDIR: illegal operation on a directory, {operation} '{path}'")]
    IsDirectory { path: String, operation: String },

    #[error("ENOTDIR: not a directory, {operation} '{path}'")]
    NotDirectory { path: String, operation: String },

    #[error("ELOOP: too many levels of symbolic links, {operation} '{path}'")]
    SymlinkLoop { path: String, operation: String },

    #[error("{message}")]
    Other { message: String },
}

impl FsError {
    pub fn not_found(operation: &str, path: &str) -> Self {
        FsError::NotFound {
            path: path.to_string(),
            operation: operation.to_string(),
        }
    }
}

/// File metadata as seen by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub mode: u32,
    pub size: u64,
    /// Logical modification stamp (monotonic, not wall clock).
    pub mtime: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub is_symlink: bool,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &str) -> bool;
    async fn stat(&self, path: &str) -> Result<FileStat, FsError>;
    /// Like `stat` but does not follow a trailing symlink.
    async fn lstat(&self, path: &str) -> Result<FileStat, FsError>;
    async fn read_file(&self, path: &str) -> Result<String, FsError>;
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    async fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError>;

    /// Resolve `target` against `base`, collapsing `.` and `..`. Pure path
    /// arithmetic; no filesystem access.
    fn resolve_path(&self, base: &str, target: &str) -> String {
        resolve_path(base, target)
    }
}

/// POSIX-style path resolution: join, then collapse `.` and `..`.
pub fn resolve_path(base: &str, target: &str) -> String {
    let joined = if target.starts_with('/') {
        target.to_string()
    } else if base.is_empty() {
        format!("/{}", target)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), target)
    };

    let mut stack: Vec<&str> = Vec::new();
    for piece in joined.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Split a path into (parent, basename).
pub fn split_path(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/".to_string(), trimmed[1..].to_string()),
        Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_collapses_dots() {
        assert_eq!(resolve_path("/home/user", "../etc/./passwd"), "/home/etc/passwd");
        assert_eq!(resolve_path("/", ".."), "/");
        assert_eq!(resolve_path("/a/b", "/x"), "/x");
        assert_eq!(resolve_path("/a/b", "c/d"), "/a/b/c/d");
    }

    #[test]
    fn split_path_parts() {
        assert_eq!(split_path("/a/b/c"), ("/a/b".into(), "c".into()));
        assert_eq!(split_path("/x"), ("/".into(), "x".into()));
        assert_eq!(split_path("/"), ("/".into(), "".into()));
    }
}
