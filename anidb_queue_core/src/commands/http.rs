//! Commands served by the AniDB HTTP API

use crate::commands::{
    AddFileToMyList, CommandContext, CommandRequest, DeleteFileFromMyList, DownloadAniDbImages,
    GetReleaseGroupStatus, MyListFileRef, QueueCommand, UpdateMyListFileStatus, ran_within,
};
use crate::config::{MyListConfig, MyListDeleteType};
use crate::error::{ProtocolError, Result};
use crate::http::{self, HttpRequest, MyListItem};
use crate::queue::Priority;
use crate::repositories::{Anime, MyListEntry, ScheduledUpdate, VideoLocal, Vote};
use crate::session::{Channel, HttpFetch};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MyList storage state AniDB uses for deleted files
const STATE_DELETED: u8 = 3;
const STATE_UNKNOWN: u8 = 0;

/// Fetch and cache an anime document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAnimeHttp {
    pub aid: u64,
    #[serde(default)]
    pub force: bool,
    /// Also queue related anime that are not cached yet
    #[serde(default)]
    pub download_related: bool,
}

#[async_trait]
impl QueueCommand for GetAnimeHttp {
    fn type_name(&self) -> &'static str {
        "GetAnimeHttp"
    }

    fn key_params(&self) -> String {
        self.aid.to_string()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(2)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Http)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        // A summary stored by GetAnimeUdp has no document and never counts as fresh
        let cached = ctx.repos.anime.anime(self.aid).await?;
        let cached_at = cached
            .as_ref()
            .filter(|a| a.has_document())
            .map(|a| a.updated_at);
        let body = match ctx
            .session
            .fetch_anime(self.aid, self.force, cached_at)
            .await?
        {
            HttpFetch::Fetched(body) => body,
            HttpFetch::Cached => return Ok(()),
        };

        if let Some(message) = http::error_message(&body) {
            if message.to_lowercase().contains("not found") {
                info!("Anime {} does not exist on AniDB", self.aid);
                return Ok(());
            }
            return Err(ProtocolError::other(format!("anime {}: {message}", self.aid)).into());
        }

        let document = http::parse_anime(&body)?;
        let anime = Anime {
            aid: self.aid,
            title: document.main_title.clone(),
            xml: body,
            episode_count: document.regular_episodes(),
            updated_at: Utc::now(),
        };
        ctx.repos.anime.save_anime(&anime).await?;
        if let Some(picture) = &document.picture {
            ctx.repos.images.register_image(picture, Some(self.aid)).await?;
        }
        info!(
            "Anime {} cached: {} ({} episodes)",
            self.aid,
            anime.title.as_deref().unwrap_or("untitled"),
            anime.episode_count
        );

        let mut follow_ons: Vec<CommandRequest> = vec![
            DownloadAniDbImages {
                aid: self.aid,
                force: false,
            }
            .into(),
            GetReleaseGroupStatus {
                aid: self.aid,
                force: true,
            }
            .into(),
        ];
        if self.download_related {
            for aid in &document.related {
                if ctx.repos.anime.anime(*aid).await?.is_none() {
                    follow_ons.push(
                        GetAnimeHttp {
                            aid: *aid,
                            force: false,
                            download_related: false,
                        }
                        .into(),
                    );
                }
            }
        }
        for request in follow_ons {
            ctx.follow_on(request).await?;
        }
        Ok(())
    }
}

/// Reconcile the remote mylist with the local library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMyList {
    #[serde(default)]
    pub force: bool,
}

/// What one local file needs after comparing it with its remote entry
fn reconcile_watched(
    video: &VideoLocal,
    remote: &MyListItem,
    policy: &MyListConfig,
) -> Reconcile {
    let remote_watched = remote.viewed_at.is_some();
    match (video.is_watched(), remote_watched) {
        (true, false) if policy.read_unwatched => Reconcile::MarkLocal(None),
        (true, false) if policy.set_watched => Reconcile::PushRemote(true),
        (false, true) if policy.read_watched => Reconcile::MarkLocal(remote.viewed_at),
        (false, true) if policy.set_unwatched => Reconcile::PushRemote(false),
        _ => Reconcile::InSync,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Reconcile {
    InSync,
    /// Store this watched time locally
    MarkLocal(Option<chrono::DateTime<Utc>>),
    /// Send this watched flag to AniDB
    PushRemote(bool),
}

#[async_trait]
impl QueueCommand for SyncMyList {
    fn type_name(&self) -> &'static str {
        "SyncMyList"
    }

    fn key_params(&self) -> String {
        String::new()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(7)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Http)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let now = Utc::now();
        let last_run = ctx.repos.schedule.last_run(ScheduledUpdate::MyListSync).await?;
        if !self.force && ran_within(last_run, ctx.config.schedule.mylist_sync_hours, now) {
            debug!("MyList synced recently, skipping");
            return Ok(());
        }

        let body = ctx.session.fetch_http(HttpRequest::MyList).await?;
        if let Some(message) = http::error_message(&body) {
            return Err(ProtocolError::other(format!("mylist: {message}")).into());
        }
        let remote = http::parse_mylist(&body)?;
        for item in &remote {
            ctx.repos
                .mylist
                .save_entry(&MyListEntry {
                    lid: item.lid,
                    fid: item.fid,
                    aid: item.aid,
                    eid: item.eid,
                    state: item.state,
                    viewed_at: item.viewed_at,
                    updated_at: now,
                })
                .await?;
        }

        let policy = &ctx.config.mylist;
        let mut by_fid: HashMap<u64, &MyListItem> = remote.iter().map(|i| (i.fid, i)).collect();
        let mut follow_ons: Vec<CommandRequest> = Vec::new();
        let mut local_updates = 0;

        for mut video in ctx.repos.videos.videos().await? {
            let Some(hashes) = video.hashes.clone() else {
                continue;
            };
            let Some(file) = ctx.repos.files.file_by_hash(&hashes.ed2k, hashes.size).await? else {
                continue;
            };
            let Some(item) = by_fid.remove(&file.fid) else {
                if policy.add_files {
                    follow_ons.push(
                        AddFileToMyList {
                            ed2k: hashes.ed2k,
                            size: hashes.size,
                        }
                        .into(),
                    );
                }
                continue;
            };

            let mut changed = video.mylist_id != Some(item.lid);
            video.mylist_id = Some(item.lid);
            let state_differs = item.state.is_some_and(|s| s != policy.storage_state);
            match reconcile_watched(&video, item, policy) {
                Reconcile::MarkLocal(watched_at) => {
                    video.watched_at = watched_at;
                    changed = true;
                }
                Reconcile::PushRemote(watched) => follow_ons.push(
                    UpdateMyListFileStatus {
                        file: MyListFileRef::File { fid: file.fid },
                        watched,
                        watched_at: if watched { video.watched_at } else { None },
                        state: None,
                    }
                    .into(),
                ),
                Reconcile::InSync if state_differs => follow_ons.push(
                    UpdateMyListFileStatus {
                        file: MyListFileRef::File { fid: file.fid },
                        watched: video.is_watched(),
                        watched_at: video.watched_at,
                        state: None,
                    }
                    .into(),
                ),
                Reconcile::InSync => {}
            }
            if changed {
                ctx.repos.videos.save_video(&video).await?;
                local_updates += 1;
            }
        }

        // Whatever is left has no local file
        let mut orphans: Vec<&MyListItem> = by_fid.into_values().collect();
        orphans.sort_by_key(|i| i.lid);
        for item in orphans {
            let file = MyListFileRef::File { fid: item.fid };
            let request: Option<CommandRequest> = match policy.delete_type {
                MyListDeleteType::Delete => Some(DeleteFileFromMyList { file }.into()),
                MyListDeleteType::MarkDeleted if item.state != Some(STATE_DELETED) => Some(
                    UpdateMyListFileStatus {
                        file,
                        watched: item.viewed_at.is_some(),
                        watched_at: item.viewed_at,
                        state: Some(STATE_DELETED),
                    }
                    .into(),
                ),
                MyListDeleteType::MarkUnknown if item.state != Some(STATE_UNKNOWN) => Some(
                    UpdateMyListFileStatus {
                        file,
                        watched: item.viewed_at.is_some(),
                        watched_at: item.viewed_at,
                        state: Some(STATE_UNKNOWN),
                    }
                    .into(),
                ),
                _ => None,
            };
            follow_ons.extend(request);
        }

        ctx.repos
            .schedule
            .set_last_run(ScheduledUpdate::MyListSync, now)
            .await?;
        info!(
            "MyList synced: {} remote entries, {local_updates} local updates, {} follow-ons",
            remote.len(),
            follow_ons.len()
        );
        for request in follow_ons {
            ctx.follow_on(request).await?;
        }
        Ok(())
    }
}

/// Copy the user's anime votes into the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncVotes {}

#[async_trait]
impl QueueCommand for SyncVotes {
    fn type_name(&self) -> &'static str {
        "SyncVotes"
    }

    fn key_params(&self) -> String {
        String::new()
    }

    fn default_priority(&self) -> Priority {
        Priority::fixed(8)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::Http)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let body = ctx.session.fetch_http(HttpRequest::Votes).await?;
        if let Some(message) = http::error_message(&body) {
            return Err(ProtocolError::other(format!("votes: {message}")).into());
        }
        let votes = http::parse_votes(&body)?;
        for vote in &votes {
            if !(1.0..=10.0).contains(&vote.value) {
                warn!("Ignoring out of range vote {} on anime {}", vote.value, vote.aid);
                continue;
            }
            ctx.repos
                .votes
                .save_vote(&Vote {
                    aid: vote.aid,
                    kind: vote.kind,
                    value: vote.value,
                })
                .await?;
        }
        ctx.repos
            .schedule
            .set_last_run(ScheduledUpdate::Votes, Utc::now())
            .await?;
        info!("{} votes synced", votes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(viewed: bool) -> MyListItem {
        MyListItem {
            lid: 1,
            fid: 2,
            aid: None,
            eid: None,
            state: Some(1),
            viewed_at: viewed.then(|| Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
        }
    }

    fn video(watched: bool) -> VideoLocal {
        let mut video = VideoLocal::new(1, "/media/a.mkv");
        if watched {
            video.watched_at = Some(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        }
        video
    }

    #[test]
    fn test_default_policy_pushes_local_watched() {
        let policy = MyListConfig::default();
        assert_eq!(
            reconcile_watched(&video(true), &item(false), &policy),
            Reconcile::PushRemote(true)
        );
    }

    #[test]
    fn test_default_policy_reads_remote_watched() {
        let policy = MyListConfig::default();
        assert_eq!(
            reconcile_watched(&video(false), &item(true), &policy),
            Reconcile::MarkLocal(item(true).viewed_at)
        );
    }

    #[test]
    fn test_unwatched_directions_follow_policy() {
        let mut policy = MyListConfig {
            read_watched: false,
            set_unwatched: true,
            ..MyListConfig::default()
        };
        assert_eq!(
            reconcile_watched(&video(false), &item(true), &policy),
            Reconcile::PushRemote(false)
        );

        policy.read_unwatched = true;
        assert_eq!(
            reconcile_watched(&video(true), &item(false), &policy),
            Reconcile::MarkLocal(None)
        );
    }

    #[test]
    fn test_matching_state_is_in_sync() {
        let policy = MyListConfig::default();
        assert_eq!(
            reconcile_watched(&video(true), &item(true), &policy),
            Reconcile::InSync
        );
        assert_eq!(
            reconcile_watched(&video(false), &item(false), &policy),
            Reconcile::InSync
        );
    }
}
