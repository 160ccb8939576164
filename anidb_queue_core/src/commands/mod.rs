//! Command catalog
//!
//! Every unit of queued work is a small serializable struct implementing
//! [`QueueCommand`]. [`CommandRequest`] is the closed set of them; it is what
//! gets persisted (as tagged JSON) and what processors decode and run.
//!
//! Commands persist their own results through the repositories and only then
//! enqueue follow-on work, so a crash mid-command never leaves follow-ons
//! pointing at data that was not saved.

pub mod anidb;
pub mod http;
pub mod local;

use crate::config::QueueClientConfig;
use crate::error::{ProtocolError, Result};
use crate::hasher::FileHasher;
use crate::images::ImageDownloader;
use crate::protocol::Response;
use crate::queue::{EnqueueOutcome, Partition, PersistedQueue, Priority};
use crate::repositories::Repositories;
use crate::session::{Channel, RateTier, SessionClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use anidb::{
    AddFileToMyList, DeleteFileFromMyList, GetAnimeUdp, GetCalendar, GetCharacter, GetEpisode,
    GetFile, GetMyListFile, GetReleaseGroup, GetReleaseGroupStatus, GetReview, GetUpdated,
    MyListFileRef, RevokeVote, UpdateMyListFileStatus, UpdateMyListStats, VoteAnime,
};
pub use http::{GetAnimeHttp, SyncMyList, SyncVotes};
pub use local::{DownloadAniDbImages, DownloadImage, HashFile, ValidateAllImages};

/// Commands sent over the UDP API
pub const UDP_COMMAND_TYPES: [&str; 16] = [
    "GetFile",
    "AddFileToMyList",
    "UpdateMyListFileStatus",
    "DeleteFileFromMyList",
    "GetMyListFile",
    "GetEpisode",
    "GetAnimeUdp",
    "GetCharacter",
    "GetReview",
    "GetReleaseGroup",
    "GetReleaseGroupStatus",
    "GetCalendar",
    "GetUpdated",
    "VoteAnime",
    "RevokeVote",
    "UpdateMyListStats",
];

/// Commands sent over the HTTP API
pub const HTTP_COMMAND_TYPES: [&str; 3] = ["GetAnimeHttp", "SyncMyList", "SyncVotes"];

/// Everything a command may touch while executing
#[derive(Clone)]
pub struct CommandContext {
    pub session: SessionClient,
    pub queue: Arc<PersistedQueue>,
    pub repos: Repositories,
    pub hasher: Arc<dyn FileHasher>,
    pub images: Arc<dyn ImageDownloader>,
    pub config: Arc<QueueClientConfig>,
}

impl CommandContext {
    /// Queue follow-on work with its default priority
    pub async fn follow_on(&self, request: impl Into<CommandRequest>) -> Result<EnqueueOutcome> {
        let request = request.into();
        debug!("Follow-on {}", request.key());
        self.queue.enqueue(&request, None).await
    }
}

/// One kind of queued work
#[async_trait]
pub trait QueueCommand: Send + Sync {
    /// Stable name stored with the command
    fn type_name(&self) -> &'static str;

    /// Parameters that make two commands equivalent
    fn key_params(&self) -> String;

    fn default_priority(&self) -> Priority;

    fn partition(&self) -> Partition {
        Partition::General
    }

    /// AniDB API this command talks to, if any
    fn channel(&self) -> Option<Channel> {
        None
    }

    fn tier(&self) -> RateTier {
        RateTier::Long
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

/// Any command of the catalog, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandRequest {
    GetFile(GetFile),
    AddFileToMyList(AddFileToMyList),
    UpdateMyListFileStatus(UpdateMyListFileStatus),
    DeleteFileFromMyList(DeleteFileFromMyList),
    GetMyListFile(GetMyListFile),
    GetEpisode(GetEpisode),
    GetAnimeUdp(GetAnimeUdp),
    GetCharacter(GetCharacter),
    GetReview(GetReview),
    GetReleaseGroup(GetReleaseGroup),
    GetReleaseGroupStatus(GetReleaseGroupStatus),
    GetCalendar(GetCalendar),
    GetUpdated(GetUpdated),
    VoteAnime(VoteAnime),
    RevokeVote(RevokeVote),
    UpdateMyListStats(UpdateMyListStats),
    GetAnimeHttp(GetAnimeHttp),
    SyncMyList(SyncMyList),
    SyncVotes(SyncVotes),
    HashFile(HashFile),
    DownloadImage(DownloadImage),
    DownloadAniDbImages(DownloadAniDbImages),
    ValidateAllImages(ValidateAllImages),
}

impl CommandRequest {
    fn inner(&self) -> &dyn QueueCommand {
        match self {
            Self::GetFile(c) => c,
            Self::AddFileToMyList(c) => c,
            Self::UpdateMyListFileStatus(c) => c,
            Self::DeleteFileFromMyList(c) => c,
            Self::GetMyListFile(c) => c,
            Self::GetEpisode(c) => c,
            Self::GetAnimeUdp(c) => c,
            Self::GetCharacter(c) => c,
            Self::GetReview(c) => c,
            Self::GetReleaseGroup(c) => c,
            Self::GetReleaseGroupStatus(c) => c,
            Self::GetCalendar(c) => c,
            Self::GetUpdated(c) => c,
            Self::VoteAnime(c) => c,
            Self::RevokeVote(c) => c,
            Self::UpdateMyListStats(c) => c,
            Self::GetAnimeHttp(c) => c,
            Self::SyncMyList(c) => c,
            Self::SyncVotes(c) => c,
            Self::HashFile(c) => c,
            Self::DownloadImage(c) => c,
            Self::DownloadAniDbImages(c) => c,
            Self::ValidateAllImages(c) => c,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.inner().type_name()
    }

    /// Dedup key, `<TypeName>_<params>`
    pub fn key(&self) -> String {
        let params = self.inner().key_params();
        if params.is_empty() {
            self.type_name().to_string()
        } else {
            format!("{}_{params}", self.type_name())
        }
    }

    pub fn default_priority(&self) -> Priority {
        self.inner().default_priority()
    }

    pub fn partition(&self) -> Partition {
        self.inner().partition()
    }

    pub fn channel(&self) -> Option<Channel> {
        self.inner().channel()
    }

    pub fn tier(&self) -> RateTier {
        self.inner().tier()
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        self.inner().execute(ctx).await
    }

    /// Decode a stored payload
    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

macro_rules! impl_from_command {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for CommandRequest {
                fn from(command: $name) -> Self {
                    CommandRequest::$name(command)
                }
            }
        )*
    };
}

impl_from_command!(
    GetFile,
    AddFileToMyList,
    UpdateMyListFileStatus,
    DeleteFileFromMyList,
    GetMyListFile,
    GetEpisode,
    GetAnimeUdp,
    GetCharacter,
    GetReview,
    GetReleaseGroup,
    GetReleaseGroupStatus,
    GetCalendar,
    GetUpdated,
    VoteAnime,
    RevokeVote,
    UpdateMyListStats,
    GetAnimeHttp,
    SyncMyList,
    SyncVotes,
    HashFile,
    DownloadImage,
    DownloadAniDbImages,
    ValidateAllImages,
);

/// The reply did not have the shape the command expects
pub(crate) fn unexpected(command: &str, response: &Response) -> crate::error::Error {
    ProtocolError::malformed(format!(
        "{command}: unexpected reply {} {}",
        response.code(),
        response.message()
    ))
    .into()
}

/// Whether a throttled job last ran less than `hours` ago
pub(crate) fn ran_within(last_run: Option<DateTime<Utc>>, hours: u64, now: DateTime<Utc>) -> bool {
    last_run.is_some_and(|at| now - at < chrono::Duration::hours(hours as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_command() -> Vec<CommandRequest> {
        vec![
            GetFile { video_id: 1, force: false }.into(),
            AddFileToMyList { ed2k: "abc".into(), size: 10 }.into(),
            UpdateMyListFileStatus {
                file: MyListFileRef::Hash { ed2k: "abc".into(), size: 10 },
                watched: true,
                watched_at: None,
                state: None,
            }
            .into(),
            DeleteFileFromMyList { file: MyListFileRef::File { fid: 9 } }.into(),
            GetMyListFile { lid: 4 }.into(),
            GetEpisode { eid: 5 }.into(),
            GetAnimeUdp { aid: 7, force: false }.into(),
            GetCharacter { char_id: 78, force: false }.into(),
            GetReview { review_id: 55, force: false }.into(),
            GetReleaseGroup { gid: 6, force: false }.into(),
            GetReleaseGroupStatus { aid: 7, force: false }.into(),
            GetCalendar { force: false }.into(),
            GetUpdated { force: false }.into(),
            VoteAnime {
                aid: 7,
                value: 8.5,
                kind: crate::protocol::messages::VoteKind::AnimePermanent,
            }
            .into(),
            RevokeVote {
                aid: 7,
                kind: crate::protocol::messages::VoteKind::AnimeTemporary,
            }
            .into(),
            UpdateMyListStats { force: false }.into(),
            GetAnimeHttp { aid: 7, force: false, download_related: false }.into(),
            SyncMyList { force: false }.into(),
            SyncVotes {}.into(),
            HashFile { video_id: 1, force: false }.into(),
            DownloadImage { file_name: "1.jpg".into(), force: false }.into(),
            DownloadAniDbImages { aid: 7, force: false }.into(),
            ValidateAllImages {}.into(),
        ]
    }

    #[test]
    fn test_payload_is_tagged_json() {
        let request: CommandRequest = GetEpisode { eid: 5 }.into();
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"type":"GetEpisode","eid":5}"#);
        assert_eq!(CommandRequest::from_payload(&json).unwrap(), request);
        assert!(CommandRequest::from_payload(r#"{"type":"GetTrailer","id":1}"#).is_err());

        let review = CommandRequest::from_payload(r#"{"type":"GetReview","review_id":55}"#).unwrap();
        assert_eq!(review.key(), "GetReview_55");
    }

    #[test]
    fn test_keys_start_with_type_name() {
        for command in every_command() {
            assert!(
                command.key().starts_with(command.type_name()),
                "{}",
                command.key()
            );
        }
        let request: CommandRequest = GetFile { video_id: 42, force: true }.into();
        assert_eq!(request.key(), "GetFile_42");
        let request: CommandRequest = ValidateAllImages {}.into();
        assert_eq!(request.key(), "ValidateAllImages");
    }

    #[test]
    fn test_channel_lists_match_catalog() {
        for command in every_command() {
            let name = command.type_name();
            match command.channel() {
                Some(Channel::Udp) => assert!(UDP_COMMAND_TYPES.contains(&name), "{name}"),
                Some(Channel::Http) => assert!(HTTP_COMMAND_TYPES.contains(&name), "{name}"),
                None => {
                    assert!(!UDP_COMMAND_TYPES.contains(&name));
                    assert!(!HTTP_COMMAND_TYPES.contains(&name));
                    assert_ne!(command.partition(), Partition::General, "{name}");
                }
            }
        }
    }

    #[test]
    fn test_partition_mapping() {
        let partitions: Vec<(&str, Partition)> = every_command()
            .iter()
            .map(|c| (c.type_name(), c.partition()))
            .filter(|(_, p)| *p != Partition::General)
            .collect();
        assert_eq!(
            partitions,
            vec![
                ("HashFile", Partition::Hasher),
                ("DownloadImage", Partition::Images),
                ("DownloadAniDbImages", Partition::Images),
                ("ValidateAllImages", Partition::Images),
            ]
        );
    }

    #[test]
    fn test_only_file_and_episode_lookups_use_the_short_tier() {
        for command in every_command() {
            let expected = if matches!(command.type_name(), "GetFile" | "GetEpisode") {
                RateTier::Short
            } else {
                RateTier::Long
            };
            assert_eq!(command.tier(), expected, "{}", command.type_name());
        }
    }

    #[test]
    fn test_ran_within() {
        let now = Utc::now();
        assert!(!ran_within(None, 24, now));
        assert!(ran_within(Some(now - chrono::Duration::hours(2)), 12, now));
        assert!(!ran_within(Some(now - chrono::Duration::hours(13)), 12, now));
    }
}
