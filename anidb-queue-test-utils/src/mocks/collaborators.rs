//! Local collaborators: file hashing and image storage

use anidb_queue_core::error::{IoError, ProtocolError};
use anidb_queue_core::hasher::{FileHasher, FileHashes, hash_bytes};
use anidb_queue_core::images::ImageDownloader;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Hasher over an in-memory file table
///
/// Paths that were never added behave like missing files.
#[derive(Clone, Default)]
pub struct MockFileHasher {
    files: Arc<Mutex<HashMap<PathBuf, FileHashes>>>,
    hashed: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file whose digests are those of `contents`
    pub fn add_file(&self, path: impl Into<PathBuf>, contents: &[u8]) -> FileHashes {
        let hashes = hash_bytes(contents);
        self.add_hashes(path, hashes.clone());
        hashes
    }

    pub fn add_hashes(&self, path: impl Into<PathBuf>, hashes: FileHashes) {
        lock(&self.files).insert(path.into(), hashes);
    }

    /// Paths hashed so far, in order
    pub fn hashed(&self) -> Vec<PathBuf> {
        lock(&self.hashed).clone()
    }
}

#[async_trait]
impl FileHasher for MockFileHasher {
    async fn hash_file(&self, path: &Path) -> anidb_queue_core::Result<FileHashes> {
        lock(&self.hashed).push(path.to_path_buf());
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::file_not_found(path).into())
    }
}

#[derive(Default)]
struct ImageState {
    on_disk: HashSet<String>,
    missing_remotely: HashSet<String>,
    downloads: Vec<String>,
}

/// Image store that only remembers names
#[derive(Clone, Default)]
pub struct MockImageDownloader {
    state: Arc<Mutex<ImageState>>,
}

impl MockImageDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `file_name` is already stored
    pub fn add_existing(&self, file_name: &str) {
        lock(&self.state).on_disk.insert(file_name.to_string());
    }

    /// Make downloads of `file_name` fail as if the CDN had no such image
    pub fn missing_remotely(&self, file_name: &str) {
        lock(&self.state)
            .missing_remotely
            .insert(file_name.to_string());
    }

    /// File names downloaded so far, in order
    pub fn downloads(&self) -> Vec<String> {
        lock(&self.state).downloads.clone()
    }
}

#[async_trait]
impl ImageDownloader for MockImageDownloader {
    async fn exists(&self, file_name: &str) -> bool {
        lock(&self.state).on_disk.contains(file_name)
    }

    async fn download(&self, file_name: &str) -> anidb_queue_core::Result<PathBuf> {
        let mut state = lock(&self.state);
        state.downloads.push(file_name.to_string());
        if state.missing_remotely.contains(file_name) {
            return Err(ProtocolError::other(format!("image {file_name} does not exist")).into());
        }
        state.on_disk.insert(file_name.to_string());
        Ok(PathBuf::from("images").join(file_name))
    }
}
