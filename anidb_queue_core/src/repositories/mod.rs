//! Entity repositories used by the command catalog
//!
//! Each entity kind has its own trait so commands depend only on what they
//! touch. All traits are implemented on top of [`DocumentStore`], a key/value
//! store of JSON documents; [`MemoryRepository`] and, with the `database`
//! feature, `SqliteEntityStore` provide one.

pub mod memory;

use crate::error::Result;
use crate::hasher::FileHashes;
use crate::protocol::messages::{GroupStatusEntry, VoteKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use memory::MemoryRepository;

/// A file in the local library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLocal {
    pub id: u64,
    pub path: PathBuf,
    pub hashes: Option<FileHashes>,
    /// MyList entry id once the file has been added
    pub mylist_id: Option<u64>,
    pub watched_at: Option<DateTime<Utc>>,
}

impl VideoLocal {
    pub fn new(id: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            hashes: None,
            mylist_id: None,
            watched_at: None,
        }
    }

    pub fn is_watched(&self) -> bool {
        self.watched_at.is_some()
    }

    pub fn ed2k(&self) -> Option<&str> {
        self.hashes.as_ref().map(|h| h.ed2k.as_str())
    }
}

/// AniDB's record of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AniDbFile {
    pub fid: u64,
    pub aid: Option<u64>,
    pub eid: Option<u64>,
    pub gid: Option<u64>,
    pub size: u64,
    pub ed2k: String,
    pub state: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

/// Cached anime document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anime {
    pub aid: u64,
    pub title: Option<String>,
    /// Raw HTTP API document
    pub xml: String,
    /// Regular episodes known locally
    pub episode_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Anime {
    /// Whether the HTTP API document has been fetched
    pub fn has_document(&self) -> bool {
        !self.xml.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub eid: u64,
    pub aid: u64,
    pub epno: Option<String>,
    pub length_minutes: Option<u32>,
    pub title: Option<String>,
    pub aired: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseGroup {
    pub gid: u64,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub url: Option<String>,
    pub picture: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One group's progress on one anime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatus {
    pub aid: u64,
    pub gid: u64,
    pub name: String,
    pub completion_state: u8,
    pub last_episode: u32,
    pub episode_range: Option<String>,
}

impl GroupStatus {
    pub fn from_entry(aid: u64, entry: &GroupStatusEntry) -> Self {
        Self {
            aid,
            gid: entry.gid,
            name: entry.name.clone(),
            completion_state: entry.completion_state,
            last_episode: entry.last_episode,
            episode_range: entry.episode_range.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyListEntry {
    pub lid: u64,
    pub fid: u64,
    pub aid: Option<u64>,
    pub eid: Option<u64>,
    pub state: Option<u8>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyListStats {
    pub anime: u64,
    pub episodes: u64,
    pub files: u64,
    pub size_mb: u64,
    pub viewed_episodes: u64,
    pub votes: u64,
    pub reviews: u64,
    pub viewed_minutes: u64,
    pub updated_at: DateTime<Utc>,
}

/// An AniDB character, as returned by CHARACTER
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub char_id: u64,
    pub name: Option<String>,
    pub kanji_name: Option<String>,
    pub picture: Option<String>,
    pub gender: Option<String>,
    /// Anime the character appears in
    pub anime_ids: Vec<u64>,
    pub updated_at: DateTime<Utc>,
}

/// A user review; the text is reassembled from every part AniDB sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: u64,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub aid: u64,
    pub kind: VoteKind,
    /// 1.00 to 10.00
    pub value: f64,
}

/// An image AniDB references, and whether it is on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub file_name: String,
    pub aid: Option<u64>,
    pub downloaded: bool,
}

/// Periodic jobs throttled by their last run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledUpdate {
    Calendar,
    Updated,
    MyListSync,
    MyListStats,
    Votes,
}

impl ScheduledUpdate {
    pub const ALL: [ScheduledUpdate; 5] = [
        Self::Calendar,
        Self::Updated,
        Self::MyListSync,
        Self::MyListStats,
        Self::Votes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Updated => "updated",
            Self::MyListSync => "mylist_sync",
            Self::MyListStats => "mylist_stats",
            Self::Votes => "votes",
        }
    }
}

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn video(&self, id: u64) -> Result<Option<VideoLocal>>;
    async fn video_by_hash(&self, ed2k: &str, size: u64) -> Result<Option<VideoLocal>>;
    async fn videos(&self) -> Result<Vec<VideoLocal>>;
    async fn save_video(&self, video: &VideoLocal) -> Result<()>;
}

#[async_trait]
pub trait AniDbFileRepository: Send + Sync {
    async fn file(&self, fid: u64) -> Result<Option<AniDbFile>>;
    async fn file_by_hash(&self, ed2k: &str, size: u64) -> Result<Option<AniDbFile>>;
    async fn save_file(&self, file: &AniDbFile) -> Result<()>;
}

#[async_trait]
pub trait AnimeRepository: Send + Sync {
    async fn anime(&self, aid: u64) -> Result<Option<Anime>>;
    async fn anime_ids(&self) -> Result<Vec<u64>>;
    async fn save_anime(&self, anime: &Anime) -> Result<()>;
}

#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    async fn episode(&self, eid: u64) -> Result<Option<Episode>>;
    async fn save_episode(&self, episode: &Episode) -> Result<()>;
}

#[async_trait]
pub trait ReleaseGroupRepository: Send + Sync {
    async fn group(&self, gid: u64) -> Result<Option<ReleaseGroup>>;
    async fn save_group(&self, group: &ReleaseGroup) -> Result<()>;
    async fn group_statuses(&self, aid: u64) -> Result<Vec<GroupStatus>>;
    /// Replace every status stored for `aid`
    async fn save_group_statuses(&self, aid: u64, statuses: &[GroupStatus]) -> Result<()>;
}

#[async_trait]
pub trait MyListRepository: Send + Sync {
    async fn entry(&self, lid: u64) -> Result<Option<MyListEntry>>;
    async fn save_entry(&self, entry: &MyListEntry) -> Result<()>;
    async fn stats(&self) -> Result<Option<MyListStats>>;
    async fn save_stats(&self, stats: &MyListStats) -> Result<()>;
}

#[async_trait]
pub trait CharacterRepository: Send + Sync {
    async fn character(&self, char_id: u64) -> Result<Option<Character>>;
    async fn save_character(&self, character: &Character) -> Result<()>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn review(&self, review_id: u64) -> Result<Option<Review>>;
    async fn save_review(&self, review: &Review) -> Result<()>;
}

#[async_trait]
pub trait VoteRepository: Send + Sync {
    async fn vote(&self, aid: u64, kind: VoteKind) -> Result<Option<Vote>>;
    async fn votes(&self) -> Result<Vec<Vote>>;
    async fn save_vote(&self, vote: &Vote) -> Result<()>;
    async fn delete_vote(&self, aid: u64, kind: VoteKind) -> Result<()>;
}

#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn image(&self, file_name: &str) -> Result<Option<ImageRecord>>;
    /// Register an image; keeps the downloaded flag of an existing record
    async fn register_image(&self, file_name: &str, aid: Option<u64>) -> Result<()>;
    async fn images(&self) -> Result<Vec<ImageRecord>>;
    async fn anime_images(&self, aid: u64) -> Result<Vec<ImageRecord>>;
    async fn missing_images(&self) -> Result<Vec<ImageRecord>>;
    async fn mark_downloaded(&self, file_name: &str) -> Result<()>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn last_run(&self, update: ScheduledUpdate) -> Result<Option<DateTime<Utc>>>;
    async fn set_last_run(&self, update: ScheduledUpdate, at: DateTime<Utc>) -> Result<()>;
}

/// JSON documents keyed by (kind, key)
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_document(&self, kind: &str, key: &str, json: String) -> Result<()>;
    async fn get_document(&self, kind: &str, key: &str) -> Result<Option<String>>;
    /// Every document of `kind`, ordered by key
    async fn list_documents(&self, kind: &str) -> Result<Vec<String>>;
    /// Remove a document; a missing one is not an error
    async fn delete_document(&self, kind: &str, key: &str) -> Result<()>;
}

mod kind {
    pub const VIDEO: &str = "video";
    pub const FILE: &str = "anidb_file";
    pub const ANIME: &str = "anime";
    pub const EPISODE: &str = "episode";
    pub const GROUP: &str = "release_group";
    pub const GROUP_STATUS: &str = "group_status";
    pub const MYLIST: &str = "mylist_entry";
    pub const MYLIST_STATS: &str = "mylist_stats";
    pub const CHARACTER: &str = "character";
    pub const REVIEW: &str = "review";
    pub const VOTE: &str = "vote";
    pub const IMAGE: &str = "image";
    pub const SCHEDULE: &str = "schedule";
}

/// Zero-padded so that key order is numeric order
fn id_key(id: u64) -> String {
    format!("{id:020}")
}

fn hash_key(ed2k: &str, size: u64) -> String {
    format!("{}_{size}", ed2k.to_lowercase())
}

async fn put<D, T>(store: &D, kind: &str, key: &str, value: &T) -> Result<()>
where
    D: DocumentStore + ?Sized,
    T: Serialize + Sync,
{
    store
        .put_document(kind, key, serde_json::to_string(value)?)
        .await
}

async fn get<D, T>(store: &D, kind: &str, key: &str) -> Result<Option<T>>
where
    D: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_document(kind, key).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

async fn list<D, T>(store: &D, kind: &str) -> Result<Vec<T>>
where
    D: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    store
        .list_documents(kind)
        .await?
        .iter()
        .map(|json| serde_json::from_str(json).map_err(Into::into))
        .collect()
}

#[async_trait]
impl<D: DocumentStore> VideoRepository for D {
    async fn video(&self, id: u64) -> Result<Option<VideoLocal>> {
        get(self, kind::VIDEO, &id_key(id)).await
    }

    async fn video_by_hash(&self, ed2k: &str, size: u64) -> Result<Option<VideoLocal>> {
        let videos: Vec<VideoLocal> = list(self, kind::VIDEO).await?;
        Ok(videos.into_iter().find(|v| {
            v.hashes
                .as_ref()
                .is_some_and(|h| h.size == size && h.ed2k.eq_ignore_ascii_case(ed2k))
        }))
    }

    async fn videos(&self) -> Result<Vec<VideoLocal>> {
        list(self, kind::VIDEO).await
    }

    async fn save_video(&self, video: &VideoLocal) -> Result<()> {
        put(self, kind::VIDEO, &id_key(video.id), video).await
    }
}

#[async_trait]
impl<D: DocumentStore> AniDbFileRepository for D {
    async fn file(&self, fid: u64) -> Result<Option<AniDbFile>> {
        get(self, kind::FILE, &id_key(fid)).await
    }

    async fn file_by_hash(&self, ed2k: &str, size: u64) -> Result<Option<AniDbFile>> {
        let Some(fid) = self
            .get_document(kind::FILE, &hash_key(ed2k, size))
            .await?
        else {
            return Ok(None);
        };
        match fid.parse::<u64>() {
            Ok(fid) => self.file(fid).await,
            Err(_) => Ok(None),
        }
    }

    async fn save_file(&self, file: &AniDbFile) -> Result<()> {
        put(self, kind::FILE, &id_key(file.fid), file).await?;
        self.put_document(kind::FILE, &hash_key(&file.ed2k, file.size), file.fid.to_string())
            .await
    }
}

#[async_trait]
impl<D: DocumentStore> AnimeRepository for D {
    async fn anime(&self, aid: u64) -> Result<Option<Anime>> {
        get(self, kind::ANIME, &id_key(aid)).await
    }

    async fn anime_ids(&self) -> Result<Vec<u64>> {
        let anime: Vec<Anime> = list(self, kind::ANIME).await?;
        Ok(anime.into_iter().map(|a| a.aid).collect())
    }

    async fn save_anime(&self, anime: &Anime) -> Result<()> {
        put(self, kind::ANIME, &id_key(anime.aid), anime).await
    }
}

#[async_trait]
impl<D: DocumentStore> EpisodeRepository for D {
    async fn episode(&self, eid: u64) -> Result<Option<Episode>> {
        get(self, kind::EPISODE, &id_key(eid)).await
    }

    async fn save_episode(&self, episode: &Episode) -> Result<()> {
        put(self, kind::EPISODE, &id_key(episode.eid), episode).await
    }
}

#[async_trait]
impl<D: DocumentStore> ReleaseGroupRepository for D {
    async fn group(&self, gid: u64) -> Result<Option<ReleaseGroup>> {
        get(self, kind::GROUP, &id_key(gid)).await
    }

    async fn save_group(&self, group: &ReleaseGroup) -> Result<()> {
        put(self, kind::GROUP, &id_key(group.gid), group).await
    }

    async fn group_statuses(&self, aid: u64) -> Result<Vec<GroupStatus>> {
        Ok(get(self, kind::GROUP_STATUS, &id_key(aid))
            .await?
            .unwrap_or_default())
    }

    async fn save_group_statuses(&self, aid: u64, statuses: &[GroupStatus]) -> Result<()> {
        put(self, kind::GROUP_STATUS, &id_key(aid), &statuses).await
    }
}

#[async_trait]
impl<D: DocumentStore> MyListRepository for D {
    async fn entry(&self, lid: u64) -> Result<Option<MyListEntry>> {
        get(self, kind::MYLIST, &id_key(lid)).await
    }

    async fn save_entry(&self, entry: &MyListEntry) -> Result<()> {
        put(self, kind::MYLIST, &id_key(entry.lid), entry).await
    }

    async fn stats(&self) -> Result<Option<MyListStats>> {
        get(self, kind::MYLIST_STATS, "current").await
    }

    async fn save_stats(&self, stats: &MyListStats) -> Result<()> {
        put(self, kind::MYLIST_STATS, "current", stats).await
    }
}

fn vote_key(aid: u64, kind: VoteKind) -> String {
    let suffix = match kind {
        VoteKind::AnimePermanent => "permanent",
        VoteKind::AnimeTemporary => "temporary",
        VoteKind::Group => "group",
    };
    format!("{}_{suffix}", id_key(aid))
}

#[async_trait]
impl<D: DocumentStore> VoteRepository for D {
    async fn vote(&self, aid: u64, kind: VoteKind) -> Result<Option<Vote>> {
        get(self, kind::VOTE, &vote_key(aid, kind)).await
    }

    async fn votes(&self) -> Result<Vec<Vote>> {
        list(self, kind::VOTE).await
    }

    async fn save_vote(&self, vote: &Vote) -> Result<()> {
        put(self, kind::VOTE, &vote_key(vote.aid, vote.kind), vote).await
    }

    async fn delete_vote(&self, aid: u64, kind: VoteKind) -> Result<()> {
        self.delete_document(kind::VOTE, &vote_key(aid, kind)).await
    }
}

#[async_trait]
impl<D: DocumentStore> CharacterRepository for D {
    async fn character(&self, char_id: u64) -> Result<Option<Character>> {
        get(self, kind::CHARACTER, &id_key(char_id)).await
    }

    async fn save_character(&self, character: &Character) -> Result<()> {
        put(self, kind::CHARACTER, &id_key(character.char_id), character).await
    }
}

#[async_trait]
impl<D: DocumentStore> ReviewRepository for D {
    async fn review(&self, review_id: u64) -> Result<Option<Review>> {
        get(self, kind::REVIEW, &id_key(review_id)).await
    }

    async fn save_review(&self, review: &Review) -> Result<()> {
        put(self, kind::REVIEW, &id_key(review.review_id), review).await
    }
}

#[async_trait]
impl<D: DocumentStore> ImageRepository for D {
    async fn image(&self, file_name: &str) -> Result<Option<ImageRecord>> {
        get(self, kind::IMAGE, file_name).await
    }

    async fn register_image(&self, file_name: &str, aid: Option<u64>) -> Result<()> {
        let downloaded = self
            .image(file_name)
            .await?
            .is_some_and(|existing| existing.downloaded);
        let record = ImageRecord {
            file_name: file_name.to_string(),
            aid,
            downloaded,
        };
        put(self, kind::IMAGE, file_name, &record).await
    }

    async fn images(&self) -> Result<Vec<ImageRecord>> {
        list(self, kind::IMAGE).await
    }

    async fn anime_images(&self, aid: u64) -> Result<Vec<ImageRecord>> {
        let images: Vec<ImageRecord> = list(self, kind::IMAGE).await?;
        Ok(images.into_iter().filter(|i| i.aid == Some(aid)).collect())
    }

    async fn missing_images(&self) -> Result<Vec<ImageRecord>> {
        let images: Vec<ImageRecord> = list(self, kind::IMAGE).await?;
        Ok(images.into_iter().filter(|i| !i.downloaded).collect())
    }

    async fn mark_downloaded(&self, file_name: &str) -> Result<()> {
        let mut record = self.image(file_name).await?.unwrap_or(ImageRecord {
            file_name: file_name.to_string(),
            aid: None,
            downloaded: false,
        });
        record.downloaded = true;
        put(self, kind::IMAGE, file_name, &record).await
    }
}

#[async_trait]
impl<D: DocumentStore> ScheduleRepository for D {
    async fn last_run(&self, update: ScheduledUpdate) -> Result<Option<DateTime<Utc>>> {
        get(self, kind::SCHEDULE, update.as_str()).await
    }

    async fn set_last_run(&self, update: ScheduledUpdate, at: DateTime<Utc>) -> Result<()> {
        put(self, kind::SCHEDULE, update.as_str(), &at).await
    }
}

/// One handle per entity kind, as used by the command catalog
#[derive(Clone)]
pub struct Repositories {
    pub videos: Arc<dyn VideoRepository>,
    pub files: Arc<dyn AniDbFileRepository>,
    pub anime: Arc<dyn AnimeRepository>,
    pub episodes: Arc<dyn EpisodeRepository>,
    pub groups: Arc<dyn ReleaseGroupRepository>,
    pub mylist: Arc<dyn MyListRepository>,
    pub characters: Arc<dyn CharacterRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub votes: Arc<dyn VoteRepository>,
    pub images: Arc<dyn ImageRepository>,
    pub schedule: Arc<dyn ScheduleRepository>,
}

impl Repositories {
    /// Serve every repository from one document store
    pub fn from_store<D: DocumentStore + 'static>(store: Arc<D>) -> Self {
        Self {
            videos: store.clone(),
            files: store.clone(),
            anime: store.clone(),
            episodes: store.clone(),
            groups: store.clone(),
            mylist: store.clone(),
            characters: store.clone(),
            reviews: store.clone(),
            votes: store.clone(),
            images: store.clone(),
            schedule: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryRepository::new()))
    }
}
