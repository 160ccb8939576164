//! Image download collaborator

use crate::error::{IoError, ProtocolError, Result};
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stores AniDB images on local disk
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Whether `file_name` is already on disk
    async fn exists(&self, file_name: &str) -> bool;

    /// Fetch `file_name` and return where it was written
    async fn download(&self, file_name: &str) -> Result<PathBuf>;
}

/// [`ImageDownloader`] that fetches from the AniDB CDN with reqwest
pub struct HttpImageDownloader {
    client: reqwest::Client,
    base_url: String,
    directory: PathBuf,
}

impl HttpImageDownloader {
    pub fn new(base_url: impl Into<String>, directory: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ProtocolError::other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            directory: directory.into(),
        })
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn exists(&self, file_name: &str) -> bool {
        tokio::fs::metadata(self.path_for(file_name))
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    async fn download(&self, file_name: &str) -> Result<PathBuf> {
        let url = format!("{}/{file_name}", self.base_url);
        debug!("Downloading image {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProtocolError::network(format!("image request failed: {e}")))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProtocolError::other(format!("image {file_name} does not exist")).into());
        }
        if !status.is_success() {
            return Err(ProtocolError::network(format!("image server returned {status}")).into());
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProtocolError::network(format!("failed to read image body: {e}")))?;

        let path = self.path_for(file_name);
        write_atomically(&path, &bytes).await?;
        Ok(path)
    }
}

/// Write through a temporary sibling so a crash never leaves a truncated image
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IoError::from_std(e).with_path(parent))?;
    }
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, bytes)
        .await
        .map_err(|e| IoError::from_std(e).with_path(&partial))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| IoError::from_std(e).with_path(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_exists_checks_directory() {
        let dir = TempDir::new().unwrap();
        let downloader = HttpImageDownloader::new("https://cdn.example/images/", dir.path()).unwrap();

        assert!(!downloader.exists("1.jpg").await);
        std::fs::write(dir.path().join("1.jpg"), b"jpeg").unwrap();
        assert!(downloader.exists("1.jpg").await);
        assert_eq!(downloader.base_url, "https://cdn.example/images");
    }

    #[tokio::test]
    async fn test_write_atomically_creates_parent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("anime").join("2.jpg");

        write_atomically(&target, b"data").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"data");
        assert!(!target.with_extension("part").exists());
    }
}
