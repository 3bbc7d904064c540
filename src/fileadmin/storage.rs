//! File storage seam and the local filesystem implementation.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    /// Path relative to the storage root, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Paths are relative to the storage root and `/`-separated; an empty path is the root.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>, StorageError>;

    async fn metadata(&self, path: &str) -> Result<FileEntry, StorageError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace a file.
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    async fn create_dir(&self, path: &str) -> Result<(), StorageError>;

    /// Fails with `AlreadyExists` when `to` is taken.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    /// Remove a directory and everything below it.
    async fn delete_dir(&self, path: &str) -> Result<(), StorageError>;
}

/// Resolve `.` and `..` segments. Errors when the path climbs above the root.
pub fn normalize_path(path: &str) -> Result<String, StorageError> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(&['/', '\\'][..]) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::OutsideBase(path.to_string()));
                }
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Parent directory of a normalized path; the root is its own parent.
pub fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Files under a base directory on the local disk.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        LocalFileStorage { base: base.into() }
    }

    fn full_path(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
        let rel = normalize_path(path)?;
        let full = if rel.is_empty() {
            self.base.clone()
        } else {
            self.base.join(&rel)
        };
        Ok((rel, full))
    }

    fn entry(rel: &str, meta: &std::fs::Metadata) -> FileEntry {
        FileEntry {
            name: name_of(rel).to_string(),
            path: rel.to_string(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

fn map_io(path: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
        ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
        _ => StorageError::Io(e),
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>, StorageError> {
        let (rel, full) = self.full_path(dir)?;
        let mut reader = tokio::fs::read_dir(&full).await.map_err(|e| map_io(&rel, e))?;
        let mut out = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            let meta = item.metadata().await?;
            let name = item.file_name().to_string_lossy().into_owned();
            out.push(Self::entry(&join_path(&rel, &name), &meta));
        }
        Ok(out)
    }

    async fn metadata(&self, path: &str) -> Result<FileEntry, StorageError> {
        let (rel, full) = self.full_path(path)?;
        let meta = tokio::fs::metadata(&full).await.map_err(|e| map_io(&rel, e))?;
        Ok(Self::entry(&rel, &meta))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let (rel, full) = self.full_path(path)?;
        tokio::fs::read(&full).await.map_err(|e| map_io(&rel, e))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let (rel, full) = self.full_path(path)?;
        if rel.is_empty() {
            return Err(StorageError::AlreadyExists(rel));
        }
        tokio::fs::write(&full, data).await.map_err(|e| map_io(&rel, e))
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        let (rel, full) = self.full_path(path)?;
        tokio::fs::create_dir(&full).await.map_err(|e| map_io(&rel, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let (from_rel, from_full) = self.full_path(from)?;
        let (to_rel, to_full) = self.full_path(to)?;
        if tokio::fs::try_exists(&to_full).await? {
            return Err(StorageError::AlreadyExists(to_rel));
        }
        tokio::fs::rename(&from_full, &to_full)
            .await
            .map_err(|e| map_io(&from_rel, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let (rel, full) = self.full_path(path)?;
        tokio::fs::remove_file(&full).await.map_err(|e| map_io(&rel, e))
    }

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError> {
        let (rel, full) = self.full_path(path)?;
        if rel.is_empty() {
            return Err(StorageError::OutsideBase(path.to_string()));
        }
        tokio::fs::remove_dir_all(&full).await.map_err(|e| map_io(&rel, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_rejects_escapes() {
        assert_eq!(normalize_path("a/./b//c/").unwrap(), "a/b/c");
        assert_eq!(normalize_path("a/b/../c").unwrap(), "a/c");
        assert_eq!(normalize_path("").unwrap(), "");
        assert!(matches!(normalize_path("../etc"), Err(StorageError::OutsideBase(_))));
        assert!(normalize_path("a/../../x").is_err());
        assert!(normalize_path("a\\..\\..\\x").is_err());
    }

    #[test]
    fn parent_and_join() {
        assert_eq!(parent_of("a/b/c.txt"), "a/b");
        assert_eq!(parent_of("c.txt"), "");
        assert_eq!(join_path("", "x"), "x");
        assert_eq!(join_path("a", "x"), "a/x");
    }

    #[tokio::test]
    async fn local_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        storage.create_dir("docs").await.unwrap();
        storage.write("docs/a.txt", b"hello").await.unwrap();

        let listed = storage.list("docs").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "docs/a.txt");
        assert_eq!(listed[0].size, 5);
        assert!(!listed[0].is_dir);

        assert!(matches!(
            storage.create_dir("docs").await,
            Err(StorageError::AlreadyExists(_))
        ));
        storage.write("docs/b.txt", b"").await.unwrap();
        assert!(matches!(
            storage.rename("docs/a.txt", "docs/b.txt").await,
            Err(StorageError::AlreadyExists(_))
        ));
        storage.rename("docs/a.txt", "docs/c.txt").await.unwrap();
        assert_eq!(storage.read("docs/c.txt").await.unwrap(), b"hello");

        assert!(matches!(storage.read("../x").await, Err(StorageError::OutsideBase(_))));
        assert!(matches!(storage.metadata("nope").await, Err(StorageError::NotFound(_))));

        storage.delete_dir("docs").await.unwrap();
        assert!(storage.list("").await.unwrap().is_empty());
    }
}
