//! File hashing collaborator
//!
//! AniDB identifies files by size and ED2K hash. The other digests are stored
//! for display and for the FILE reply cross-check.

use crate::error::{InternalError, IoError, Result};
use async_trait::async_trait;
use log::debug;
use md4::{Digest, Md4};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// ED2K chunk size (9500 KiB)
pub const ED2K_CHUNK_SIZE: u64 = 9_728_000;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Digests of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    pub size: u64,
    pub ed2k: String,
    pub crc32: String,
    pub md5: String,
    pub sha1: String,
}

/// Computes [`FileHashes`] for a local file
#[async_trait]
pub trait FileHasher: Send + Sync {
    async fn hash_file(&self, path: &Path) -> Result<FileHashes>;
}

/// Streaming ED2K (MD4 over 9500 KiB chunks)
///
/// A file of at most one chunk hashes to that chunk's MD4. Larger files hash
/// to the MD4 of the concatenated chunk digests.
struct Ed2kState {
    chunk: Md4,
    in_chunk: u64,
    chunk_digests: Vec<u8>,
}

impl Ed2kState {
    fn new() -> Self {
        Self {
            chunk: Md4::new(),
            in_chunk: 0,
            chunk_digests: Vec::new(),
        }
    }

    fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            if self.in_chunk == ED2K_CHUNK_SIZE {
                let full = std::mem::replace(&mut self.chunk, Md4::new());
                self.chunk_digests.extend_from_slice(&full.finalize());
                self.in_chunk = 0;
            }
            let room = (ED2K_CHUNK_SIZE - self.in_chunk) as usize;
            let take = room.min(data.len());
            self.chunk.update(&data[..take]);
            self.in_chunk += take as u64;
            data = &data[take..];
        }
    }

    fn finalize(self) -> String {
        let last = self.chunk.finalize();
        if self.chunk_digests.is_empty() {
            return format!("{last:x}");
        }
        let mut root = Md4::new();
        root.update(&self.chunk_digests);
        root.update(last);
        format!("{:x}", root.finalize())
    }
}

/// Every digest fed from the same reads
struct MultiHasher {
    size: u64,
    ed2k: Ed2kState,
    crc32: crc32fast::Hasher,
    md5: Md5,
    sha1: Sha1,
}

impl MultiHasher {
    fn new() -> Self {
        Self {
            size: 0,
            ed2k: Ed2kState::new(),
            crc32: crc32fast::Hasher::new(),
            md5: Md5::new(),
            sha1: Sha1::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        self.ed2k.update(data);
        self.crc32.update(data);
        self.md5.update(data);
        self.sha1.update(data);
    }

    fn finalize(self) -> FileHashes {
        FileHashes {
            size: self.size,
            ed2k: self.ed2k.finalize(),
            crc32: format!("{:08x}", self.crc32.finalize()),
            md5: format!("{:x}", self.md5.finalize()),
            sha1: format!("{:x}", self.sha1.finalize()),
        }
    }
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> FileHashes {
    let mut hasher = MultiHasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn hash_path(path: &Path) -> Result<FileHashes> {
    let mut file = File::open(path).map_err(|e| IoError::from_std(e).with_path(path))?;
    let mut hasher = MultiHasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| IoError::from_std(e).with_path(path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

/// [`FileHasher`] that reads the file once on the blocking pool
#[derive(Debug, Default, Clone)]
pub struct Ed2kFileHasher;

#[async_trait]
impl FileHasher for Ed2kFileHasher {
    async fn hash_file(&self, path: &Path) -> Result<FileHashes> {
        if !path.is_file() {
            return Err(IoError::file_not_found(path).into());
        }
        debug!("Hashing {}", path.display());
        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_path(&owned))
            .await
            .map_err(|e| InternalError::hash_calculation("ed2k", &e.to_string()))?
    }
}
