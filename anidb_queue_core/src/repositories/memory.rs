//! In-memory document store

use crate::error::Result;
use crate::repositories::DocumentStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Document store held in a map; every repository trait is available on it
#[derive(Debug, Default)]
pub struct MemoryRepository {
    documents: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents of `kind`
    pub fn len(&self, kind: &str) -> usize {
        self.lock().keys().filter(|(k, _)| k == kind).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), String>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryRepository {
    async fn put_document(&self, kind: &str, key: &str, json: String) -> Result<()> {
        self.lock()
            .insert((kind.to_string(), key.to_string()), json);
        Ok(())
    }

    async fn get_document(&self, kind: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .get(&(kind.to_string(), key.to_string()))
            .cloned())
    }

    async fn list_documents(&self, kind: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, json)| json.clone())
            .collect())
    }

    async fn delete_document(&self, kind: &str, key: &str) -> Result<()> {
        self.lock().remove(&(kind.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use crate::protocol::messages::VoteKind;
    use crate::repositories::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_video_lookup_by_hash() {
        let repo = MemoryRepository::new();
        let mut video = VideoLocal::new(1, "/library/ep1.mkv");
        video.hashes = Some(hash_bytes(b"ep1"));
        repo.save_video(&video).await.unwrap();
        repo.save_video(&VideoLocal::new(2, "/library/ep2.mkv"))
            .await
            .unwrap();

        let ed2k = video.ed2k().unwrap().to_uppercase();
        let found = repo.video_by_hash(&ed2k, 3).await.unwrap();
        assert_eq!(found.map(|v| v.id), Some(1));
        assert!(repo.video_by_hash(&ed2k, 4).await.unwrap().is_none());
        assert_eq!(repo.videos().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_hash_index() {
        let repo = MemoryRepository::new();
        let file = AniDbFile {
            fid: 312498,
            aid: Some(4896),
            eid: Some(74795),
            gid: None,
            size: 1000,
            ed2k: "ABCDEF".to_string(),
            state: Some(1),
            updated_at: Utc::now(),
        };
        repo.save_file(&file).await.unwrap();

        assert_eq!(repo.file_by_hash("abcdef", 1000).await.unwrap(), Some(file.clone()));
        assert_eq!(repo.file(312498).await.unwrap(), Some(file));
        assert!(repo.file_by_hash("abcdef", 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_anime_ids_are_numeric_order() {
        let repo = MemoryRepository::new();
        for aid in [100, 9, 25] {
            repo.save_anime(&Anime {
                aid,
                title: None,
                xml: String::new(),
                episode_count: 0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.anime_ids().await.unwrap(), vec![9, 25, 100]);
    }

    #[tokio::test]
    async fn test_register_image_keeps_downloaded_flag() {
        let repo = MemoryRepository::new();
        repo.register_image("1.jpg", Some(1)).await.unwrap();
        repo.register_image("2.jpg", Some(1)).await.unwrap();
        repo.mark_downloaded("1.jpg").await.unwrap();
        repo.register_image("1.jpg", Some(1)).await.unwrap();

        let missing = repo.missing_images().await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].file_name, "2.jpg");
        assert_eq!(repo.anime_images(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_votes_keyed_by_kind() {
        let repo = MemoryRepository::new();
        for kind in [VoteKind::AnimePermanent, VoteKind::AnimeTemporary] {
            repo.save_vote(&Vote {
                aid: 1,
                kind,
                value: 8.0,
            })
            .await
            .unwrap();
        }
        assert_eq!(repo.votes().await.unwrap().len(), 2);
        assert!(repo.vote(1, VoteKind::Group).await.unwrap().is_none());

        repo.delete_vote(1, VoteKind::AnimeTemporary).await.unwrap();
        repo.delete_vote(1, VoteKind::Group).await.unwrap();
        let remaining = repo.votes().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, VoteKind::AnimePermanent);
    }

    #[tokio::test]
    async fn test_schedule_round_trip() {
        let repo = MemoryRepository::new();
        assert!(repo.last_run(ScheduledUpdate::Calendar).await.unwrap().is_none());

        let now = Utc::now();
        repo.set_last_run(ScheduledUpdate::Calendar, now).await.unwrap();
        assert_eq!(repo.last_run(ScheduledUpdate::Calendar).await.unwrap(), Some(now));
        assert_eq!(repo.len("schedule"), 1);
    }
}
