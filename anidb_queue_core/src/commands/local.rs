//! Commands that only touch local disk and the image CDN

use crate::commands::{CommandContext, GetFile, QueueCommand};
use crate::error::{Error, IoErrorKind, Result, ValidationError};
use crate::queue::{Partition, Priority};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Hash a library file, then identify it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashFile {
    pub video_id: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for HashFile {
    fn type_name(&self) -> &'static str {
        "HashFile"
    }

    fn key_params(&self) -> String {
        self.video_id.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(4)
    }

    fn partition(&self) -> Partition {
        Partition::Hasher
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let Some(mut video) = ctx.repos.videos.video(self.video_id).await? else {
            debug!("HashFile: video {} no longer exists", self.video_id);
            return Ok(());
        };
        if video.hashes.is_some() && !self.force {
            debug!("{} already hashed", video.path.display());
            return Ok(());
        }

        let hashes = match ctx.hasher.hash_file(&video.path).await {
            Ok(hashes) => hashes,
            Err(Error::Io(err)) if err.kind == IoErrorKind::FileNotFound => {
                warn!("{} disappeared before it could be hashed", video.path.display());
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        info!(
            "Hashed {} ({} bytes, ed2k {})",
            video.path.display(),
            hashes.size,
            hashes.ed2k
        );
        video.hashes = Some(hashes);
        ctx.repos.videos.save_video(&video).await?;

        ctx.follow_on(GetFile {
            video_id: self.video_id,
            force: self.force,
        })
        .await?;
        Ok(())
    }
}

/// Images are plain file names on the CDN
fn check_file_name(file_name: &str) -> Result<()> {
    let plain = !file_name.is_empty()
        && !file_name.contains(['/', '\\'])
        && !file_name.contains("..");
    if !plain {
        return Err(ValidationError::invalid_parameter("file_name", "not a plain file name").into());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadImage {
    pub file_name: String,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for DownloadImage {
    fn type_name(&self) -> &'static str {
        "DownloadImage"
    }

    fn key_params(&self) -> String {
        self.file_name.clone()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(2)
    }

    fn partition(&self) -> Partition {
        Partition::Images
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        check_file_name(&self.file_name)?;
        if !self.force && ctx.images.exists(&self.file_name).await {
            debug!("Image {} already on disk", self.file_name);
        } else {
            let path = ctx.images.download(&self.file_name).await?;
            info!("Image {} saved to {}", self.file_name, path.display());
        }
        ctx.repos.images.mark_downloaded(&self.file_name).await
    }
}

/// Queue every image of one anime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadAniDbImages {
    pub aid: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for DownloadAniDbImages {
    fn type_name(&self) -> &'static str {
        "DownloadAniDbImages"
    }

    fn key_params(&self) -> String {
        self.aid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::HIGHEST
    }

    fn partition(&self) -> Partition {
        Partition::Images
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let images = ctx.repos.images.anime_images(self.aid).await?;
        for image in images {
            if image.downloaded && !self.force {
                continue;
            }
            ctx.follow_on(DownloadImage {
                file_name: image.file_name,
                force: self.force,
            })
            .await?;
        }
        Ok(())
    }
}

/// Re-download every known image that is missing on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateAllImages {}

#[async_trait]
impl QueueCommand for ValidateAllImages {
    fn type_name(&self) -> &'static str {
        "ValidateAllImages"
    }

    fn key_params(&self) -> String {
        String::new()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(3)
    }

    fn partition(&self) -> Partition {
        Partition::Images
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let mut queued = 0;
        for image in ctx.repos.images.images().await? {
            if image.downloaded && ctx.images.exists(&image.file_name).await {
                continue;
            }
            ctx.follow_on(DownloadImage {
                file_name: image.file_name,
                force: true,
            })
            .await?;
            queued += 1;
        }
        info!("Image validation queued {queued} downloads");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_names_must_be_plain() {
        assert!(check_file_name("12345.jpg").is_ok());
        assert!(check_file_name("").is_err());
        assert!(check_file_name("../etc/passwd").is_err());
        assert!(check_file_name("a/b.jpg").is_err());
        assert!(check_file_name("a\\b.jpg").is_err());
    }

    #[test]
    fn test_partitions() {
        assert_eq!(HashFile { video_id: 1, force: false }.partition(), Partition::Hasher);
        assert_eq!(ValidateAllImages {}.partition(), Partition::Images);
    }
}
