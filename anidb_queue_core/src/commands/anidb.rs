//! Commands served by the AniDB UDP API

use crate::commands::{CommandContext, CommandRequest, GetAnimeHttp, QueueCommand, ran_within, unexpected};
use crate::error::{ProtocolError, Result, ValidationError};
use crate::protocol::messages::{
    AnimeCommand, CalendarCommand, CharacterCommand, EpisodeCommand, FileCommand, GroupCommand,
    GroupStatusCommand, MyListAddCommand, MyListCommand, MyListDelCommand, MyListStatsCommand,
    ReviewCommand, UpdatedCommand, VoteCommand, VoteKind,
};
use crate::protocol::{Command, Response, ResponseCode};
use crate::queue::Priority;
use crate::repositories::{
    AniDbFile, Anime, Character, Episode, GroupStatus, MyListEntry, MyListStats, ReleaseGroup,
    Review, ScheduledUpdate, Vote,
};
use crate::session::{Channel, ExecuteOutcome, RateTier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// UPDATED returns at most this many anime ids per reply
const UPDATED_PAGE_SIZE: usize = 200;

/// Stop paging UPDATED after this many replies
const UPDATED_MAX_PAGES: usize = 25;

/// Upper bound on REVIEW parts fetched for one review
const REVIEW_MAX_PARTS: u32 = 20;

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Identify a hashed library file by size and ED2K
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetFile {
    pub video_id: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetFile {
    fn type_name(&self) -> &'static str {
        "GetFile"
    }

    fn key_params(&self) -> String {
        self.video_id.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(3)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    fn tier(&self) -> RateTier {
        RateTier::Short
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let Some(mut video) = ctx.repos.videos.video(self.video_id).await? else {
            debug!("GetFile: video {} no longer exists", self.video_id);
            return Ok(());
        };
        let Some(hashes) = video.hashes.clone() else {
            debug!("GetFile: video {} has not been hashed yet", self.video_id);
            return Ok(());
        };
        if !self.force
            && ctx
                .repos
                .files
                .file_by_hash(&hashes.ed2k, hashes.size)
                .await?
                .is_some()
        {
            debug!("GetFile: {} already identified", video.path.display());
            return Ok(());
        }

        let command = Command::File(FileCommand::by_hash(hashes.size, &hashes.ed2k));
        let file = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::File(file)) => file,
            ExecuteOutcome::NoData(_) => {
                info!("{} is not known to AniDB", video.path.display());
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };
        let fid = file
            .fid
            .ok_or_else(|| ProtocolError::malformed("FILE reply without fid"))?;

        let record = AniDbFile {
            fid,
            aid: file.aid,
            eid: file.eid,
            gid: file.gid,
            size: hashes.size,
            ed2k: hashes.ed2k.clone(),
            state: file.state,
            updated_at: Utc::now(),
        };
        ctx.repos.files.save_file(&record).await?;
        if let Some(lid) = file.lid
            && video.mylist_id != Some(lid)
        {
            video.mylist_id = Some(lid);
            ctx.repos.videos.save_video(&video).await?;
        }
        info!("{} identified as file {fid}", video.path.display());

        if let Some(aid) = record.aid
            && ctx.repos.anime.anime(aid).await?.is_none()
        {
            ctx.follow_on(GetAnimeHttp {
                aid,
                force: false,
                download_related: false,
            })
            .await?;
        }
        if ctx.config.mylist.add_files && video.mylist_id.is_none() {
            ctx.follow_on(AddFileToMyList {
                ed2k: hashes.ed2k,
                size: hashes.size,
            })
            .await?;
        }
        Ok(())
    }
}

/// Add a hashed file to the user's mylist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFileToMyList {
    pub ed2k: String,
    pub size: u64,
}

#[async_trait]
impl QueueCommand for AddFileToMyList {
    fn type_name(&self) -> &'static str {
        "AddFileToMyList"
    }

    fn key_params(&self) -> String {
        format!("{}_{}", self.ed2k.to_lowercase(), self.size)
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(6)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let video = ctx.repos.videos.video_by_hash(&self.ed2k, self.size).await?;
        let mut command = MyListAddCommand::by_hash(self.size, &self.ed2k)
            .with_state(ctx.config.mylist.storage_state);
        if let Some(watched_at) = video.as_ref().and_then(|v| v.watched_at) {
            command = command.with_viewed(true, Some(watched_at.timestamp()));
        }

        let added = match ctx.session.execute(Command::MyListAdd(command), self.tier()).await? {
            ExecuteOutcome::Data(Response::MyListAdd(added)) => added,
            ExecuteOutcome::NoData(response) => {
                debug!(
                    "AddFileToMyList {}: {}",
                    self.key_params(),
                    ResponseCode(response.code())
                );
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };

        if let (Some(lid), Some(mut video)) = (added.lid, video)
            && video.mylist_id != Some(lid)
        {
            video.mylist_id = Some(lid);
            ctx.repos.videos.save_video(&video).await?;
        }
        info!("File {} recorded in mylist ({})", self.key_params(), ResponseCode(added.code));

        ctx.follow_on(UpdateMyListStats { force: false }).await?;
        Ok(())
    }
}

/// How a mylist command names its file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MyListFileRef {
    Hash { ed2k: String, size: u64 },
    File { fid: u64 },
}

impl MyListFileRef {
    fn key(&self) -> String {
        match self {
            Self::Hash { ed2k, size } => format!("{}_{size}", ed2k.to_lowercase()),
            Self::File { fid } => fid.to_string(),
        }
    }

    fn add_command(&self) -> MyListAddCommand {
        match self {
            Self::Hash { ed2k, size } => MyListAddCommand::by_hash(*size, ed2k),
            Self::File { fid } => MyListAddCommand::by_id(*fid),
        }
    }

    fn del_command(&self) -> MyListDelCommand {
        match self {
            Self::Hash { ed2k, size } => MyListDelCommand::by_hash(*size, ed2k),
            Self::File { fid } => MyListDelCommand::by_id(*fid),
        }
    }
}

impl fmt::Display for MyListFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash { ed2k, size } => write!(f, "ed2k={ed2k} size={size}"),
            Self::File { fid } => write!(f, "fid={fid}"),
        }
    }
}

/// Edit the watched and storage state of a mylist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMyListFileStatus {
    pub file: MyListFileRef,
    pub watched: bool,
    #[serde(default)]
    pub watched_at: Option<DateTime<Utc>>,
    /// Storage state to write; the configured one when absent
    #[serde(default)]
    pub state: Option<u8>,
}

#[async_trait]
impl QueueCommand for UpdateMyListFileStatus {
    fn type_name(&self) -> &'static str {
        "UpdateMyListFileStatus"
    }

    fn key_params(&self) -> String {
        format!("{}_{}", self.file.key(), u8::from(self.watched))
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(6)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let state = self.state.unwrap_or(ctx.config.mylist.storage_state);
        let command = self
            .file
            .add_command()
            .with_state(state)
            .with_viewed(self.watched, self.watched_at.map(|at| at.timestamp()))
            .edit();

        match ctx.session.execute(Command::MyListAdd(command), self.tier()).await? {
            ExecuteOutcome::Data(Response::MyListAdd(edited)) => {
                info!(
                    "MyList entry for {} updated: watched={} state={state} ({} entries)",
                    self.file,
                    self.watched,
                    edited.edited.unwrap_or(1)
                );
            }
            ExecuteOutcome::NoData(_) => debug!("No mylist entry for {}", self.file),
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        }
        Ok(())
    }
}

/// Remove a file from the user's mylist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFileFromMyList {
    pub file: MyListFileRef,
}

#[async_trait]
impl QueueCommand for DeleteFileFromMyList {
    fn type_name(&self) -> &'static str {
        "DeleteFileFromMyList"
    }

    fn key_params(&self) -> String {
        self.file.key()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(10)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let command = Command::MyListDel(self.file.del_command());
        match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::MyListDel(deleted)) => {
                info!("Removed {} from mylist ({} entries)", self.file, deleted.deleted);
            }
            ExecuteOutcome::NoData(_) => debug!("{} was not in mylist", self.file),
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMyListFile {
    pub lid: u64,
}

#[async_trait]
impl QueueCommand for GetMyListFile {
    fn type_name(&self) -> &'static str {
        "GetMyListFile"
    }

    fn key_params(&self) -> String {
        self.lid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(6)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let command = Command::MyList(MyListCommand { lid: self.lid });
        let entry = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::MyList(entry)) => entry,
            ExecuteOutcome::NoData(_) => {
                debug!("MyList entry {} does not exist", self.lid);
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };
        let fid = entry
            .fid
            .ok_or_else(|| ProtocolError::malformed("MYLIST reply without fid"))?;

        ctx.repos
            .mylist
            .save_entry(&MyListEntry {
                lid: entry.lid.unwrap_or(self.lid),
                fid,
                aid: entry.aid,
                eid: entry.eid,
                state: entry.state,
                viewed_at: timestamp(entry.viewed_at),
                updated_at: Utc::now(),
            })
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetEpisode {
    pub eid: u64,
}

#[async_trait]
impl QueueCommand for GetEpisode {
    fn type_name(&self) -> &'static str {
        "GetEpisode"
    }

    fn key_params(&self) -> String {
        self.eid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(5)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    fn tier(&self) -> RateTier {
        RateTier::Short
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let command = Command::Episode(EpisodeCommand::new(self.eid));
        let episode = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Episode(episode)) => episode,
            ExecuteOutcome::NoData(_) => {
                debug!("Episode {} does not exist", self.eid);
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };
        let aid = episode
            .aid
            .ok_or_else(|| ProtocolError::malformed("EPISODE reply without aid"))?;

        ctx.repos
            .episodes
            .save_episode(&Episode {
                eid: self.eid,
                aid,
                epno: episode.epno.clone(),
                length_minutes: episode.length,
                title: episode
                    .title_english
                    .clone()
                    .or_else(|| episode.title_romaji.clone()),
                aired: timestamp(episode.aired),
                updated_at: Utc::now(),
            })
            .await
    }
}

/// Summary record of an anime over UDP, and the characters it lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAnimeUdp {
    pub aid: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetAnimeUdp {
    fn type_name(&self) -> &'static str {
        "GetAnimeUdp"
    }

    fn key_params(&self) -> String {
        self.aid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(5)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let cached = ctx.repos.anime.anime(self.aid).await?;
        if !self.force && cached.is_some() {
            debug!("Anime {} already cached", self.aid);
            return Ok(());
        }

        let command = Command::Anime(AnimeCommand { aid: self.aid });
        let summary = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Anime(summary)) => summary,
            ExecuteOutcome::NoData(_) => {
                info!("Anime {} does not exist on AniDB", self.aid);
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };

        // Keep a cached HTTP document and its refresh time
        let mut anime = cached.unwrap_or(Anime {
            aid: self.aid,
            title: None,
            xml: String::new(),
            episode_count: 0,
            updated_at: Utc::now(),
        });
        anime.title = summary
            .title_romaji
            .clone()
            .or_else(|| summary.title_english.clone())
            .or(anime.title);
        if let Some(episodes) = summary.episodes {
            anime.episode_count = anime.episode_count.max(episodes);
        }
        ctx.repos.anime.save_anime(&anime).await?;
        if let Some(picture) = &summary.picture {
            ctx.repos.images.register_image(picture, Some(self.aid)).await?;
        }
        info!(
            "Anime {} summary stored: {} ({} characters)",
            self.aid,
            anime.title.as_deref().unwrap_or("untitled"),
            summary.character_ids.len()
        );

        let mut unknown = Vec::new();
        for char_id in &summary.character_ids {
            if ctx.repos.characters.character(*char_id).await?.is_none() {
                unknown.push(*char_id);
            }
        }
        for char_id in unknown {
            ctx.follow_on(GetCharacter {
                char_id,
                force: false,
            })
            .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetCharacter {
    pub char_id: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetCharacter {
    fn type_name(&self) -> &'static str {
        "GetCharacter"
    }

    fn key_params(&self) -> String {
        self.char_id.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(7)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if !self.force && ctx.repos.characters.character(self.char_id).await?.is_some() {
            debug!("Character {} already known", self.char_id);
            return Ok(());
        }

        let command = Command::Character(CharacterCommand {
            char_id: self.char_id,
        });
        let character = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Character(character)) => character,
            ExecuteOutcome::NoData(_) => {
                debug!("Character {} does not exist", self.char_id);
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };

        ctx.repos
            .characters
            .save_character(&Character {
                char_id: self.char_id,
                name: character.name.clone(),
                kanji_name: character.kanji_name.clone(),
                picture: character.picture.clone(),
                gender: character.gender.clone(),
                anime_ids: character.anime_ids.clone(),
                updated_at: Utc::now(),
            })
            .await?;

        if let Some(picture) = &character.picture {
            ctx.repos.images.register_image(picture, None).await?;
            ctx.follow_on(crate::commands::DownloadImage {
                file_name: picture.clone(),
                force: false,
            })
            .await?;
        }
        Ok(())
    }
}

/// Fetch a review, one part per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReview {
    pub review_id: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetReview {
    fn type_name(&self) -> &'static str {
        "GetReview"
    }

    fn key_params(&self) -> String {
        self.review_id.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(7)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if !self.force && ctx.repos.reviews.review(self.review_id).await?.is_some() {
            debug!("Review {} already known", self.review_id);
            return Ok(());
        }

        let mut text = String::new();
        let mut part = 0;
        loop {
            let command = Command::Review(ReviewCommand {
                review_id: self.review_id,
                part,
            });
            let reply = match ctx.session.execute(command, self.tier()).await? {
                ExecuteOutcome::Data(Response::Review(reply)) => reply,
                ExecuteOutcome::NoData(_) if part == 0 => {
                    debug!("Review {} does not exist", self.review_id);
                    return Ok(());
                }
                ExecuteOutcome::NoData(response) | ExecuteOutcome::Data(response) => {
                    return Err(unexpected(self.type_name(), &response));
                }
            };
            text.push_str(&reply.text);
            part += 1;
            if !reply.has_more() {
                break;
            }
            if part >= REVIEW_MAX_PARTS {
                return Err(ProtocolError::malformed(format!(
                    "review {} claims {} parts",
                    self.review_id, reply.part_count
                ))
                .into());
            }
        }

        ctx.repos
            .reviews
            .save_review(&Review {
                review_id: self.review_id,
                text,
                updated_at: Utc::now(),
            })
            .await?;
        info!("Review {} stored ({part} parts)", self.review_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReleaseGroup {
    pub gid: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetReleaseGroup {
    fn type_name(&self) -> &'static str {
        "GetReleaseGroup"
    }

    fn key_params(&self) -> String {
        self.gid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(5)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if !self.force && ctx.repos.groups.group(self.gid).await?.is_some() {
            debug!("Release group {} already known", self.gid);
            return Ok(());
        }

        let command = Command::Group(GroupCommand { gid: self.gid });
        let group = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Group(group)) => group,
            ExecuteOutcome::NoData(_) => {
                debug!("Release group {} does not exist", self.gid);
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };

        ctx.repos
            .groups
            .save_group(&ReleaseGroup {
                gid: self.gid,
                name: group.name.clone(),
                short_name: group.short_name.clone(),
                url: group.url.clone(),
                picture: group.picture.clone(),
                updated_at: Utc::now(),
            })
            .await?;

        if let Some(picture) = &group.picture {
            ctx.repos.images.register_image(picture, None).await?;
            ctx.follow_on(crate::commands::DownloadImage {
                file_name: picture.clone(),
                force: false,
            })
            .await?;
        }
        Ok(())
    }
}

/// Which groups release an anime, and how far they got
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReleaseGroupStatus {
    pub aid: u64,
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetReleaseGroupStatus {
    fn type_name(&self) -> &'static str {
        "GetReleaseGroupStatus"
    }

    fn key_params(&self) -> String {
        self.aid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(5)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if !self.force && !ctx.repos.groups.group_statuses(self.aid).await?.is_empty() {
            debug!("Group status of anime {} already known", self.aid);
            return Ok(());
        }

        let command = Command::GroupStatus(GroupStatusCommand { aid: self.aid });
        let response = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::GroupStatus(response)) => response,
            ExecuteOutcome::NoData(response) => {
                debug!(
                    "No group status for anime {}: {}",
                    self.aid,
                    ResponseCode(response.code())
                );
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };

        let statuses: Vec<GroupStatus> = response
            .groups
            .iter()
            .map(|entry| GroupStatus::from_entry(self.aid, entry))
            .collect();
        ctx.repos
            .groups
            .save_group_statuses(self.aid, &statuses)
            .await?;

        let mut follow_ons: Vec<CommandRequest> = Vec::new();
        for status in &statuses {
            if ctx.repos.groups.group(status.gid).await?.is_none() {
                follow_ons.push(
                    GetReleaseGroup {
                        gid: status.gid,
                        force: false,
                    }
                    .into(),
                );
            }
        }
        if let (Some(latest), Some(anime)) = (
            response.latest_episode(),
            ctx.repos.anime.anime(self.aid).await?,
        ) && latest > anime.episode_count
        {
            info!(
                "Anime {}: groups released episode {latest}, {} known locally",
                self.aid, anime.episode_count
            );
            follow_ons.push(
                GetAnimeHttp {
                    aid: self.aid,
                    force: true,
                    download_related: false,
                }
                .into(),
            );
        }
        for request in follow_ons {
            ctx.follow_on(request).await?;
        }
        Ok(())
    }
}

/// Upcoming and recently aired anime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetCalendar {
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetCalendar {
    fn type_name(&self) -> &'static str {
        "GetCalendar"
    }

    fn key_params(&self) -> String {
        String::new()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(5)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let now = Utc::now();
        let last_run = ctx.repos.schedule.last_run(ScheduledUpdate::Calendar).await?;
        if !self.force && ran_within(last_run, ctx.config.schedule.calendar_hours, now) {
            debug!("Calendar checked recently, skipping");
            return Ok(());
        }

        let command = Command::Calendar(CalendarCommand);
        let entries = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Calendar(calendar)) => calendar.entries,
            ExecuteOutcome::NoData(_) => Vec::new(),
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        };
        ctx.repos
            .schedule
            .set_last_run(ScheduledUpdate::Calendar, now)
            .await?;

        let mut queued = 0;
        for entry in entries {
            if ctx.repos.anime.anime(entry.aid).await?.is_none() {
                ctx.follow_on(GetAnimeHttp {
                    aid: entry.aid,
                    force: false,
                    download_related: false,
                })
                .await?;
                queued += 1;
            }
        }
        info!("Calendar checked, {queued} new anime queued");
        Ok(())
    }
}

/// Refresh every locally known anime that AniDB changed since the last check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetUpdated {
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for GetUpdated {
    fn type_name(&self) -> &'static str {
        "GetUpdated"
    }

    fn key_params(&self) -> String {
        String::new()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(4)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let now = Utc::now();
        let last_run = ctx.repos.schedule.last_run(ScheduledUpdate::Updated).await?;
        if !self.force && ran_within(last_run, ctx.config.schedule.updated_hours, now) {
            debug!("Updates checked recently, skipping");
            return Ok(());
        }

        let known: HashSet<u64> = ctx.repos.anime.anime_ids().await?.into_iter().collect();
        let mut since = last_run
            .unwrap_or_else(|| now - chrono::Duration::days(1))
            .timestamp();
        let mut changed = Vec::new();

        for _ in 0..UPDATED_MAX_PAGES {
            let command = Command::Updated(UpdatedCommand { since });
            let page = match ctx.session.execute(command, self.tier()).await? {
                ExecuteOutcome::Data(Response::Updated(page)) => page,
                ExecuteOutcome::NoData(_) => break,
                ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
            };
            changed.extend(page.anime_ids.iter().copied().filter(|aid| known.contains(aid)));

            let complete = page.anime_ids.len() < UPDATED_PAGE_SIZE
                || page.total <= page.anime_ids.len() as u64;
            match page.last_update {
                Some(last) if !complete && last > since => since = last,
                _ => break,
            }
        }

        ctx.repos
            .schedule
            .set_last_run(ScheduledUpdate::Updated, now)
            .await?;
        changed.sort_unstable();
        changed.dedup();
        info!("{} locally known anime changed on AniDB", changed.len());
        for aid in changed {
            ctx.follow_on(GetAnimeHttp {
                aid,
                force: true,
                download_related: false,
            })
            .await?;
        }
        Ok(())
    }
}

fn vote_kind_name(kind: VoteKind) -> &'static str {
    match kind {
        VoteKind::AnimePermanent => "permanent",
        VoteKind::AnimeTemporary => "temporary",
        VoteKind::Group => "group",
    }
}

/// Cast or change a vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteAnime {
    pub aid: u64,
    /// 1.00 to 10.00
    pub value: f64,
    pub kind: VoteKind,
}

#[async_trait]
impl QueueCommand for VoteAnime {
    fn type_name(&self) -> &'static str {
        "VoteAnime"
    }

    fn key_params(&self) -> String {
        format!("{}_{}", self.aid, vote_kind_name(self.kind))
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(8)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if !(1.0..=10.0).contains(&self.value) {
            return Err(
                ValidationError::invalid_parameter("value", "votes range from 1.00 to 10.00")
                    .into(),
            );
        }
        let command = Command::Vote(VoteCommand {
            id: self.aid,
            kind: self.kind,
            value: (self.value * 100.0).round() as i32,
        });

        match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Vote(vote)) if vote.is_accepted() => {
                ctx.repos
                    .votes
                    .save_vote(&Vote {
                        aid: self.aid,
                        kind: self.kind,
                        value: self.value,
                    })
                    .await?;
                info!("Voted {:.2} on anime {}", self.value, self.aid);
            }
            ExecuteOutcome::NoData(response) => info!(
                "Vote on anime {} not recorded: {}",
                self.aid,
                ResponseCode(response.code())
            ),
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        }
        Ok(())
    }
}

/// Withdraw a vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeVote {
    pub aid: u64,
    pub kind: VoteKind,
}

#[async_trait]
impl QueueCommand for RevokeVote {
    fn type_name(&self) -> &'static str {
        "RevokeVote"
    }

    fn key_params(&self) -> String {
        format!("{}_{}", self.aid, vote_kind_name(self.kind))
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(8)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let command = Command::Vote(VoteCommand::revoke(self.aid, self.kind));
        match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::Vote(vote)) if vote.is_accepted() => {
                info!("Vote on anime {} revoked", self.aid);
            }
            // 360: AniDB has no such vote, so there is nothing left to keep
            ExecuteOutcome::NoData(response) if response.code() == 360 => {
                debug!("Anime {} had no vote to revoke", self.aid);
            }
            ExecuteOutcome::NoData(response) => {
                info!(
                    "Vote on anime {} not revoked: {}",
                    self.aid,
                    ResponseCode(response.code())
                );
                return Ok(());
            }
            ExecuteOutcome::Data(other) => return Err(unexpected(self.type_name(), &other)),
        }
        ctx.repos.votes.delete_vote(self.aid, self.kind).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMyListStats {
    #[serde(default)]
    pub force: bool,
}

#[async_trait]
impl QueueCommand for UpdateMyListStats {
    fn type_name(&self) -> &'static str {
        "UpdateMyListStats"
    }

    fn key_params(&self) -> String {
        String::new()
    }

    fn default_priority(&self) -> Priority {
        Priority::LOWEST
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Udp)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let now = Utc::now();
        let last_run = ctx
            .repos
            .schedule
            .last_run(ScheduledUpdate::MyListStats)
            .await?;
        if !self.force && ran_within(last_run, ctx.config.schedule.mylist_stats_hours, now) {
            debug!("MyList stats refreshed recently, skipping");
            return Ok(());
        }

        let command = Command::MyListStats(MyListStatsCommand);
        let stats = match ctx.session.execute(command, self.tier()).await? {
            ExecuteOutcome::Data(Response::MyListStats(stats)) => stats,
            ExecuteOutcome::NoData(response) | ExecuteOutcome::Data(response) => {
                return Err(unexpected(self.type_name(), &response));
            }
        };
        ctx.repos
            .mylist
            .save_stats(&MyListStats {
                anime: stats.anime,
                episodes: stats.episodes,
                files: stats.files,
                size_mb: stats.size_mb,
                viewed_episodes: stats.viewed_episodes,
                votes: stats.votes,
                reviews: stats.reviews,
                viewed_minutes: stats.viewed_minutes,
                updated_at: now,
            })
            .await?;
        ctx.repos
            .schedule
            .set_last_run(ScheduledUpdate::MyListStats, now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ref_keys() {
        let by_hash = MyListFileRef::Hash {
            ed2k: "ABCDEF".to_string(),
            size: 42,
        };
        assert_eq!(by_hash.key(), "abcdef_42");
        assert_eq!(by_hash.to_string(), "ed2k=ABCDEF size=42");
        assert_eq!(MyListFileRef::File { fid: 7 }.key(), "7");
    }

    #[test]
    fn test_status_key_separates_watched_and_unwatched() {
        let watched = UpdateMyListFileStatus {
            file: MyListFileRef::File { fid: 7 },
            watched: true,
            watched_at: None,
            state: None,
        };
        let unwatched = UpdateMyListFileStatus {
            watched: false,
            ..watched.clone()
        };
        assert_ne!(watched.key_params(), unwatched.key_params());
    }

    #[test]
    fn test_file_ref_serialization() {
        let json = serde_json::to_string(&MyListFileRef::File { fid: 7 }).unwrap();
        assert_eq!(json, r#"{"file":{"fid":7}}"#);
    }

    #[test]
    fn test_vote_key_names_kind() {
        let vote = VoteAnime {
            aid: 12,
            value: 9.0,
            kind: VoteKind::AnimeTemporary,
        };
        assert_eq!(vote.key_params(), "12_temporary");
        assert_eq!(vote.default_priority(), Priority::new(8).unwrap());
    }

    #[test]
    fn test_revoke_shares_vote_key_shape() {
        let revoke = RevokeVote {
            aid: 12,
            kind: VoteKind::AnimePermanent,
        };
        assert_eq!(revoke.key_params(), "12_permanent");
        assert_eq!(revoke.default_priority(), Priority::new(8).unwrap());
    }

    #[test]
    fn test_episode_lookups_use_short_tier() {
        assert_eq!(GetEpisode { eid: 1 }.tier(), RateTier::Short);
        assert_eq!(GetCharacter { char_id: 1, force: false }.tier(), RateTier::Long);
    }

    #[test]
    fn test_unix_timestamps() {
        assert_eq!(timestamp(None), None);
        assert_eq!(timestamp(Some(0)).map(|t| t.timestamp()), Some(0));
    }
}
