//! In-memory filesystem.
//!
//! A flat map of absolute paths to entries behind a tokio `RwLock`.
//! Symlinks resolve with a hop limit; modification stamps come from a
//! logical clock so tests are deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{resolve_path, split_path, DirEntry, FileStat, FileSystem, FsError};

const SYMLINK_HOPS: usize = 16;

#[derive(Debug, Clone)]
enum Entry {
    File { content: Vec<u8>, mode: u32, mtime: u64 },
    Dir { mode: u32, mtime: u64 },
    Symlink { target: String, mtime: u64 },
}

pub struct MemFs {
    entries: RwLock<HashMap<String, Entry>>,
    clock: AtomicU64,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "/".to_string(),
            Entry::Dir {
                mode: 0o755,
                mtime: 0,
            },
        );
        Self {
            entries: RwLock::new(entries),
            clock: AtomicU64::new(1),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a symlink (test/bootstrap helper; not part of the trait).
    pub async fn symlink(&self, target: &str, link_path: &str) -> Result<(), FsError> {
        let mtime = self.tick();
        let mut entries = self.entries.write().await;
        entries.insert(
            normalize(link_path),
            Entry::Symlink {
                target: target.to_string(),
                mtime,
            },
        );
        Ok(())
    }

    pub async fn set_mode(&self, path: &str, mode: u32) -> Result<(), FsError> {
        let mut entries = self.entries.write().await;
        let resolved = resolve_links(&entries, &normalize(path))
            .ok_or_else(|| FsError::not_found("chmod", path))?;
        match entries.get_mut(&resolved) {
            Some(Entry::File { mode: m, .. }) | Some(Entry::Dir { mode: m, .. }) => {
                *m = mode;
                Ok(())
            }
            _ => Err(FsError::not_found("chmod", path)),
        }
    }
}

fn normalize(path: &str) -> String {
    resolve_path("/", path)
}

/// Follow symlinks (including intermediate path components) to a canonical
/// entry path, or None when a component is missing.
fn resolve_links(entries: &HashMap<String, Entry>, path: &str) -> Option<String> {
    let mut current = path.to_string();
    for _ in 0..SYMLINK_HOPS {
        // Resolve symlinked parents component by component.
        let mut assembled = String::new();
        let mut restart = false;
        for piece in current.trim_start_matches('/').split('/') {
            if piece.is_empty() {
                continue;
            }
            let candidate = format!("{}/{}", assembled, piece);
            if let Some(Entry::Symlink { target, .. }) = entries.get(&candidate) {
                let parent = if assembled.is_empty() { "/" } else { &assembled };
                let rest = &current[candidate.len()..];
                current = format!("{}{}", resolve_path(parent, target), rest);
                restart = true;
                break;
            }
            assembled = candidate;
        }
        if restart {
            continue;
        }
        return Some(if assembled.is_empty() {
            "/".to_string()
        } else {
            assembled
        });
    }
    None
}

fn stat_of(entry: &Entry) -> FileStat {
    match entry {
        Entry::File { content, mode, mtime } => FileStat {
            is_file: true,
            is_directory: false,
            is_symlink: false,
            mode: *mode,
            size: content.len() as u64,
            mtime: *mtime,
        },
        Entry::Dir { mode, mtime } => FileStat {
            is_file: false,
            is_directory: true,
            is_symlink: false,
            mode: *mode,
            size: 0,
            mtime: *mtime,
        },
        Entry::Symlink { mtime, .. } => FileStat {
            is_file: false,
            is_directory: false,
            is_symlink: true,
            mode: 0o777,
            size: 0,
            mtime: *mtime,
        },
    }
}

#[async_trait]
impl FileSystem for MemFs {
    async fn exists(&self, path: &str) -> bool {
        let entries = self.entries.read().await;
        match resolve_links(&entries, &normalize(path)) {
            Some(p) => entries.contains_key(&p),
            None => false,
        }
    }

    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let entries = self.entries.read().await;
        let resolved = resolve_links(&entries, &normalize(path))
            .ok_or_else(|| FsError::SymlinkLoop {
                path: path.to_string(),
                operation: "stat".to_string(),
            })?;
        let entry = entries
            .get(&resolved)
            .ok_or_else(|| FsError::not_found("stat", path))?;
        // A trailing symlink is followed by stat.
        if let Entry::Symlink { target, .. } = entry {
            let (parent, _) = split_path(&resolved);
            let target_path = resolve_path(&parent, target);
            let resolved_target = resolve_links(&entries, &target_path)
                .ok_or_else(|| FsError::not_found("stat", path))?;
            let target_entry = entries
                .get(&resolved_target)
                .ok_or_else(|| FsError::not_found("stat", path))?;
            return Ok(stat_of(target_entry));
        }
        Ok(stat_of(entry))
    }

    async fn lstat(&self, path: &str) -> Result<FileStat, FsError> {
        let entries = self.entries.read().await;
        let normalized = normalize(path);
        if let Some(entry) = entries.get(&normalized) {
            return Ok(stat_of(entry));
        }
        let resolved = resolve_links(&entries, &normalized)
            .ok_or_else(|| FsError::not_found("lstat", path))?;
        entries
            .get(&resolved)
            .map(stat_of)
            .ok_or_else(|| FsError::not_found("lstat", path))
    }

    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let entries = self.entries.read().await;
        let resolved = resolve_links(&entries, &normalize(path))
            .ok_or_else(|| FsError::not_found("open", path))?;
        match entries.get(&resolved) {
            Some(Entry::File { content, .. }) => Ok(String::from_utf8_lossy(content).into_owned()),
            Some(Entry::Symlink { target, .. }) => {
                let (parent, _) = split_path(&resolved);
                let target_path = resolve_path(&parent, target);
                drop(entries);
                // Box the recursion for the async trait.
                Box::pin(self.read_file(&target_path)).await
            }
            Some(Entry::Dir { .. }) => Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "read".to_string(),
            }),
            None => Err(FsError::not_found("open", path)),
        }
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mtime = self.tick();
        let mut entries = self.entries.write().await;
        let normalized = normalize(path);
        let resolved = resolve_links(&entries, &normalized).unwrap_or(normalized);
        let (parent, name) = split_path(&resolved);
        if name.is_empty() {
            return Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "write".to_string(),
            });
        }
        match entries.get(&parent) {
            Some(Entry::Dir { .. }) => {}
            Some(_) => {
                return Err(FsError::NotDirectory {
                    path: parent,
                    operation: "write".to_string(),
                })
            }
            None => return Err(FsError::not_found("open", &parent)),
        }
        match entries.get(&resolved) {
            Some(Entry::Dir { .. }) => Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "write".to_string(),
            }),
            Some(Entry::Symlink { target, .. }) => {
                let target = target.clone();
                let (link_parent, _) = split_path(&resolved);
                let target_path = resolve_path(&link_parent, &target);
                entries.insert(
                    target_path,
                    Entry::File {
                        content: content.to_vec(),
                        mode: 0o644,
                        mtime,
                    },
                );
                Ok(())
            }
            _ => {
                entries.insert(
                    resolved,
                    Entry::File {
                        content: content.to_vec(),
                        mode: 0o644,
                        mtime,
                    },
                );
                Ok(())
            }
        }
    }

    async fn append_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mtime = self.tick();
        let mut entries = self.entries.write().await;
        let normalized = normalize(path);
        let resolved = resolve_links(&entries, &normalized).unwrap_or(normalized);
        match entries.get_mut(&resolved) {
            Some(Entry::File {
                content: existing,
                mtime: m,
                ..
            }) => {
                existing.extend_from_slice(content);
                *m = mtime;
                Ok(())
            }
            Some(Entry::Dir { .. }) => Err(FsError::IsDirectory {
                path: path.to_string(),
                operation: "append".to_string(),
            }),
            _ => {
                drop(entries);
                self.write_file(path, content).await
            }
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let entries = self.entries.read().await;
        let resolved = resolve_links(&entries, &normalize(path))
            .ok_or_else(|| FsError::not_found("scandir", path))?;
        match entries.get(&resolved) {
            Some(Entry::Dir { .. }) => {}
            Some(_) => {
                return Err(FsError::NotDirectory {
                    path: path.to_string(),
                    operation: "scandir".to_string(),
                })
            }
            None => return Err(FsError::not_found("scandir", path)),
        }
        let prefix = if resolved == "/" {
            "/".to_string()
        } else {
            format!("{}/", resolved)
        };
        let mut out = Vec::new();
        for (p, entry) in entries.iter() {
            if let Some(rest) = p.strip_prefix(&prefix) {
                if rest.is_empty() || rest.contains('/') {
                    continue;
                }
                out.push(DirEntry {
                    name: rest.to_string(),
                    is_directory: matches!(entry, Entry::Dir { .. }),
                    is_symlink: matches!(entry, Entry::Symlink { .. }),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let mtime = self.tick();
        let mut entries = self.entries.write().await;
        let normalized = normalize(path);
        if entries.contains_key(&normalized) {
            if recursive {
                return Ok(());
            }
            return Err(FsError::AlreadyExists {
                path: path.to_string(),
                operation: "mkdir".to_string(),
            });
        }
        let (parent, _) = split_path(&normalized);
        if !entries.contains_key(&parent) {
            if !recursive {
                return Err(FsError::not_found("mkdir", &parent));
            }
            // Create missing ancestors.
            let mut assembled = String::new();
            for piece in normalized.trim_start_matches('/').split('/') {
                assembled = format!("{}/{}", assembled, piece);
                entries
                    .entry(assembled.clone())
                    .or_insert(Entry::Dir { mode: 0o755, mtime });
            }
            return Ok(());
        }
        match entries.get(&parent) {
            Some(Entry::Dir { .. }) => {
                entries.insert(normalized, Entry::Dir { mode: 0o755, mtime });
                Ok(())
            }
            _ => Err(FsError::NotDirectory {
                path: parent,
                operation: "mkdir".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_read() {
        let fs = MemFs::new();
        fs.write_file("/a.txt", b"hello").await.unwrap();
        assert_eq!(fs.read_file("/a.txt").await.unwrap(), "hello");
        assert!(fs.exists("/a.txt").await);
        assert!(!fs.exists("/b.txt").await);
    }

    #[tokio::test]
    async fn append_creates_and_extends() {
        let fs = MemFs::new();
        fs.append_file("/log", b"a").await.unwrap();
        fs.append_file("/log", b"b").await.unwrap();
        assert_eq!(fs.read_file("/log").await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn mkdir_recursive_and_read_dir() {
        let fs = MemFs::new();
        fs.mkdir("/a/b/c", true).await.unwrap();
        fs.write_file("/a/b/f.txt", b"x").await.unwrap();
        let names: Vec<String> = fs
            .read_dir("/a/b")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["c", "f.txt"]);
    }

    #[tokio::test]
    async fn mkdir_without_parent_fails() {
        let fs = MemFs::new();
        assert!(fs.mkdir("/x/y", false).await.is_err());
        assert!(fs.mkdir("/x/y", true).await.is_ok());
    }

    #[tokio::test]
    async fn stat_follows_symlink_lstat_does_not() {
        let fs = MemFs::new();
        fs.write_file("/real", b"data").await.unwrap();
        fs.symlink("/real", "/link").await.unwrap();
        assert!(fs.stat("/link").await.unwrap().is_file);
        assert!(fs.lstat("/link").await.unwrap().is_symlink);
        assert_eq!(fs.read_file("/link").await.unwrap(), "data");
    }

    #[tokio::test]
    async fn symlinked_directory_components() {
        let fs = MemFs::new();
        fs.mkdir("/data/sub", true).await.unwrap();
        fs.write_file("/data/sub/f", b"1").await.unwrap();
        fs.symlink("/data", "/d").await.unwrap();
        assert_eq!(fs.read_file("/d/sub/f").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn mtime_is_monotonic() {
        let fs = MemFs::new();
        fs.write_file("/a", b"1").await.unwrap();
        fs.write_file("/b", b"2").await.unwrap();
        let a = fs.stat("/a").await.unwrap().mtime;
        let b = fs.stat("/b").await.unwrap().mtime;
        assert!(b > a);
    }
}
