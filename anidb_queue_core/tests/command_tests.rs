//! Individual commands run against mock collaborators
//!
//! Each test executes one command directly and checks what it persisted and
//! which follow-on commands it queued.

use anidb_queue_core::commands::{
    AddFileToMyList, DownloadAniDbImages, DownloadImage, GetAnimeHttp, GetAnimeUdp, GetCalendar,
    GetCharacter, GetFile, GetReleaseGroup, GetReleaseGroupStatus, GetReview, GetUpdated, HashFile,
    RevokeVote, SyncMyList, SyncVotes, UpdateMyListStats, ValidateAllImages, VoteAnime,
};
use anidb_queue_core::config::MyListDeleteType;
use anidb_queue_core::error::Error;
use anidb_queue_core::http::HttpRequest;
use anidb_queue_core::protocol::messages::VoteKind;
use anidb_queue_core::repositories::{AniDbFile, Anime, ScheduledUpdate, VideoLocal, Vote};
use anidb_queue_core::{CommandRequest, Partition};
use anidb_queue_test_utils::{TestContext, anime_xml};
use chrono::{TimeZone, Utc};

fn file_reply(fid: u64, aid: u64, lid: u64, size: u64, ed2k: &str) -> String {
    format!("220 FILE\n{fid}|{aid}|74795|7172|{lid}|1|{size}|{ed2k}|md5|sha1|crc")
}

/// Keys of every queued command, sorted
async fn queued(test: &TestContext) -> Vec<String> {
    let mut keys = Vec::new();
    for partition in Partition::ALL {
        for stored in test.queue().list(partition, 100).await.unwrap() {
            keys.push(stored.command_key);
        }
    }
    keys.sort();
    keys
}

async fn queued_request(test: &TestContext, key: &str) -> CommandRequest {
    for partition in Partition::ALL {
        for stored in test.queue().list(partition, 100).await.unwrap() {
            if stored.command_key == key {
                return CommandRequest::from_payload(&stored.payload).unwrap();
            }
        }
    }
    panic!("{key} was not queued");
}

async fn cache_anime(test: &TestContext, aid: u64, episode_count: u32) {
    test.repos()
        .anime
        .save_anime(&Anime {
            aid,
            title: Some(format!("Anime {aid}")),
            xml: anime_xml(aid, "cached", episode_count),
            episode_count,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

async fn identify(test: &TestContext, video: &VideoLocal, fid: u64) {
    let hashes = video.hashes.clone().unwrap();
    test.repos()
        .files
        .save_file(&AniDbFile {
            fid,
            aid: Some(4896),
            eid: None,
            gid: None,
            size: hashes.size,
            ed2k: hashes.ed2k,
            state: Some(1),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

async fn run(test: &TestContext, request: impl Into<CommandRequest>) -> anidb_queue_core::Result<()> {
    request.into().execute(&test.ctx).await
}

#[tokio::test]
async fn test_get_file_saves_record_and_queues_follow_ons() {
    let test = TestContext::builder().build().unwrap();
    let video = test.add_hashed_video(1, b"episode one").await.unwrap();
    let hashes = video.hashes.clone().unwrap();
    test.server
        .reply("FILE", file_reply(312_498, 4896, 0, hashes.size, &hashes.ed2k));
    test.login().await.unwrap();

    run(&test, GetFile { video_id: 1, force: false }).await.unwrap();

    let sent = &test.server.sent_for("FILE")[0];
    assert_eq!(sent.param("size"), Some(hashes.size.to_string().as_str()));
    assert_eq!(sent.param("ed2k"), Some(hashes.ed2k.as_str()));

    let file = test
        .repos()
        .files
        .file_by_hash(&hashes.ed2k, hashes.size)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.fid, 312_498);
    assert_eq!(file.aid, Some(4896));
    assert_eq!(
        queued(&test).await,
        vec![
            format!("AddFileToMyList_{}_{}", hashes.ed2k, hashes.size),
            "GetAnimeHttp_4896".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_get_file_records_existing_mylist_entry() {
    let test = TestContext::builder().build().unwrap();
    let video = test.add_hashed_video(1, b"episode one").await.unwrap();
    let hashes = video.hashes.clone().unwrap();
    cache_anime(&test, 4896, 12).await;
    test.server
        .reply("FILE", file_reply(312_498, 4896, 55, hashes.size, &hashes.ed2k));
    test.login().await.unwrap();

    run(&test, GetFile { video_id: 1, force: false }).await.unwrap();

    let video = test.repos().videos.video(1).await.unwrap().unwrap();
    assert_eq!(video.mylist_id, Some(55));
    assert!(queued(&test).await.is_empty());
}

#[tokio::test]
async fn test_get_file_unknown_to_anidb_is_a_no_op() {
    let test = TestContext::builder().build().unwrap();
    let video = test.add_hashed_video(1, b"home video").await.unwrap();
    let hashes = video.hashes.unwrap();
    test.server.reply("FILE", "320 NO SUCH FILE");
    test.login().await.unwrap();

    run(&test, GetFile { video_id: 1, force: false }).await.unwrap();

    assert!(
        test.repos()
            .files
            .file_by_hash(&hashes.ed2k, hashes.size)
            .await
            .unwrap()
            .is_none()
    );
    assert!(queued(&test).await.is_empty());
}

#[tokio::test]
async fn test_get_file_skips_identified_files_unless_forced() {
    let test = TestContext::builder().build().unwrap();
    let video = test.add_hashed_video(1, b"episode one").await.unwrap();
    identify(&test, &video, 312_498).await;
    let hashes = video.hashes.unwrap();
    test.server
        .respond_always("FILE", file_reply(312_498, 4896, 0, hashes.size, &hashes.ed2k));
    test.login().await.unwrap();

    run(&test, GetFile { video_id: 1, force: false }).await.unwrap();
    assert_eq!(test.server.count("FILE"), 0);

    run(&test, GetFile { video_id: 1, force: true }).await.unwrap();
    assert_eq!(test.server.count("FILE"), 1);
}

#[tokio::test]
async fn test_add_to_mylist_stores_lid_and_refreshes_stats() {
    let test = TestContext::builder().build().unwrap();
    let mut video = test.add_hashed_video(1, b"episode one").await.unwrap();
    video.watched_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap());
    test.repos().videos.save_video(&video).await.unwrap();
    let hashes = video.hashes.clone().unwrap();
    test.server.reply("MYLISTADD", "210 MYLIST ENTRY ADDED\n777");
    test.login().await.unwrap();

    run(
        &test,
        AddFileToMyList {
            ed2k: hashes.ed2k.clone(),
            size: hashes.size,
        },
    )
    .await
    .unwrap();

    let sent = &test.server.sent_for("MYLISTADD")[0];
    assert_eq!(sent.param("state"), Some("1"));
    assert_eq!(sent.param("viewed"), Some("1"));
    let video = test.repos().videos.video(1).await.unwrap().unwrap();
    assert_eq!(video.mylist_id, Some(777));
    assert_eq!(queued(&test).await, vec!["UpdateMyListStats"]);
}

#[tokio::test]
async fn test_anime_is_cached_with_image_and_follow_ons() {
    let test = TestContext::builder().build().unwrap();
    test.http.anime(4896, anime_xml(4896, "Spice and Wolf", 13));
    test.login().await.unwrap();

    run(
        &test,
        GetAnimeHttp {
            aid: 4896,
            force: false,
            download_related: false,
        },
    )
    .await
    .unwrap();

    let anime = test.repos().anime.anime(4896).await.unwrap().unwrap();
    assert_eq!(anime.title.as_deref(), Some("Spice and Wolf"));
    assert_eq!(anime.episode_count, 13);
    let image = test.repos().images.image("4896.jpg").await.unwrap().unwrap();
    assert_eq!(image.aid, Some(4896));
    assert!(!image.downloaded);

    assert_eq!(
        queued(&test).await,
        vec!["DownloadAniDbImages_4896", "GetReleaseGroupStatus_4896"]
    );
    let status = queued_request(&test, "GetReleaseGroupStatus_4896").await;
    assert_eq!(
        status,
        GetReleaseGroupStatus {
            aid: 4896,
            force: true
        }
        .into()
    );
}

#[tokio::test]
async fn test_fresh_cached_anime_is_not_fetched_again() {
    let test = TestContext::builder().build().unwrap();
    cache_anime(&test, 4896, 13).await;
    test.login().await.unwrap();

    run(
        &test,
        GetAnimeHttp {
            aid: 4896,
            force: false,
            download_related: false,
        },
    )
    .await
    .unwrap();

    assert!(test.http.calls().is_empty());
    assert!(queued(&test).await.is_empty());
}

#[tokio::test]
async fn test_missing_anime_is_not_an_error() {
    let test = TestContext::builder().build().unwrap();
    test.http
        .anime(99_999, r#"<error code="404">Anime not found</error>"#);
    test.login().await.unwrap();

    run(
        &test,
        GetAnimeHttp {
            aid: 99_999,
            force: false,
            download_related: false,
        },
    )
    .await
    .unwrap();

    assert!(test.repos().anime.anime(99_999).await.unwrap().is_none());
    assert!(queued(&test).await.is_empty());
}

#[tokio::test]
async fn test_group_status_queues_groups_and_refreshes_stale_anime() {
    let test = TestContext::builder().build().unwrap();
    cache_anime(&test, 4896, 2).await;
    test.server.reply(
        "GROUPSTATUS",
        "225 GROUP STATUS\n7172|Frostii|2|4|800|10|1-4\n8001|Other|1|3|700|30|1-3",
    );
    test.login().await.unwrap();

    run(&test, GetReleaseGroupStatus { aid: 4896, force: true })
        .await
        .unwrap();

    let statuses = test.repos().groups.group_statuses(4896).await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(
        queued(&test).await,
        vec!["GetAnimeHttp_4896", "GetReleaseGroup_7172", "GetReleaseGroup_8001"]
    );
    let refresh = queued_request(&test, "GetAnimeHttp_4896").await;
    assert!(matches!(refresh, CommandRequest::GetAnimeHttp(GetAnimeHttp { force: true, .. })));

    // Known statuses are not asked for again unless forced
    run(&test, GetReleaseGroupStatus { aid: 4896, force: false })
        .await
        .unwrap();
    assert_eq!(test.server.count("GROUPSTATUS"), 1);
}

#[tokio::test]
async fn test_release_group_is_saved_and_logo_queued() {
    let test = TestContext::builder().build().unwrap();
    test.server.reply(
        "GROUP",
        "250 GROUP\n7172|800|10|50|900|Frostii|Frost|#frostii|irc.rizon.net|http://frostii.com|7172.png",
    );
    test.login().await.unwrap();

    run(&test, GetReleaseGroup { gid: 7172, force: false })
        .await
        .unwrap();

    let group = test.repos().groups.group(7172).await.unwrap().unwrap();
    assert_eq!(group.name.as_deref(), Some("Frostii"));
    assert_eq!(group.url.as_deref(), Some("http://frostii.com"));
    assert!(test.repos().images.image("7172.png").await.unwrap().is_some());
    assert_eq!(queued(&test).await, vec!["DownloadImage_7172.png"]);
}

#[tokio::test]
async fn test_sync_mylist_reconciles_and_handles_orphans() {
    let test = TestContext::builder().build().unwrap();
    let mut video = test.add_hashed_video(1, b"episode one").await.unwrap();
    video.watched_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap());
    test.repos().videos.save_video(&video).await.unwrap();
    identify(&test, &video, 312_498).await;

    let remote_watched = test.add_hashed_video(2, b"episode two").await.unwrap();
    identify(&test, &remote_watched, 312_499).await;

    test.http.respond(
        HttpRequest::MyList,
        r#"<mylist uid="1">
<mylistitem id="100" aid="4896" eid="74795" fid="312498"><state>1</state></mylistitem>
<mylistitem id="101" aid="4896" eid="74796" fid="312499"><state>1</state><viewdate>2021-03-04T10:00:00+00:00</viewdate></mylistitem>
<mylistitem id="102" aid="4896" eid="74797" fid="999"><state>1</state></mylistitem>
</mylist>"#,
    );
    test.login().await.unwrap();

    run(&test, SyncMyList { force: false }).await.unwrap();

    let first = test.repos().videos.video(1).await.unwrap().unwrap();
    assert_eq!(first.mylist_id, Some(100));
    let second = test.repos().videos.video(2).await.unwrap().unwrap();
    assert_eq!(second.mylist_id, Some(101));
    assert_eq!(
        second.watched_at,
        Some(Utc.with_ymd_and_hms(2021, 3, 4, 10, 0, 0).unwrap())
    );
    assert!(test.repos().mylist.entry(102).await.unwrap().is_some());

    // Local watched state pushed; the orphan marked deleted
    assert_eq!(
        queued(&test).await,
        vec!["UpdateMyListFileStatus_312498_1", "UpdateMyListFileStatus_999_0"]
    );
    match queued_request(&test, "UpdateMyListFileStatus_999_0").await {
        CommandRequest::UpdateMyListFileStatus(update) => assert_eq!(update.state, Some(3)),
        other => panic!("unexpected {other:?}"),
    }
    assert!(
        test.repos()
            .schedule
            .last_run(ScheduledUpdate::MyListSync)
            .await
            .unwrap()
            .is_some()
    );

    run(&test, SyncMyList { force: false }).await.unwrap();
    assert_eq!(test.http.count(&HttpRequest::MyList), 1);
}

#[tokio::test]
async fn test_sync_mylist_can_delete_orphans() {
    let test = TestContext::builder()
        .configure(|config| config.mylist.delete_type = MyListDeleteType::Delete)
        .build()
        .unwrap();
    test.http.respond(
        HttpRequest::MyList,
        r#"<mylist uid="1"><mylistitem id="102" aid="1" eid="2" fid="999"><state>1</state></mylistitem></mylist>"#,
    );
    test.login().await.unwrap();

    run(&test, SyncMyList { force: true }).await.unwrap();

    assert_eq!(queued(&test).await, vec!["DeleteFileFromMyList_999"]);
}

#[tokio::test]
async fn test_sync_votes_stores_both_kinds() {
    let test = TestContext::builder().build().unwrap();
    test.http.respond(
        HttpRequest::Votes,
        r#"<votes>
<anime><vote aid="4896">8.50</vote><vote aid="1">42.00</vote></anime>
<animetemporary><vote aid="5000">7.00</vote></animetemporary>
</votes>"#,
    );
    test.login().await.unwrap();

    run(&test, SyncVotes {}).await.unwrap();

    let permanent = test
        .repos()
        .votes
        .vote(4896, VoteKind::AnimePermanent)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(permanent.value, 8.5);
    assert!(
        test.repos()
            .votes
            .vote(5000, VoteKind::AnimeTemporary)
            .await
            .unwrap()
            .is_some()
    );
    // Out of range values are skipped
    assert_eq!(test.repos().votes.votes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vote_validates_range_before_sending() {
    let test = TestContext::builder().build().unwrap();
    test.server.reply("VOTE", "260 VOTED\nSpice and Wolf|850|1|4896");
    test.login().await.unwrap();

    let err = run(
        &test,
        VoteAnime {
            aid: 4896,
            value: 11.0,
            kind: VoteKind::AnimePermanent,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(test.server.count("VOTE"), 0);

    run(
        &test,
        VoteAnime {
            aid: 4896,
            value: 8.5,
            kind: VoteKind::AnimePermanent,
        },
    )
    .await
    .unwrap();
    assert_eq!(test.server.sent_for("VOTE")[0].param("value"), Some("850"));
    assert!(
        test.repos()
            .votes
            .vote(4896, VoteKind::AnimePermanent)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_calendar_queues_unknown_anime_and_is_throttled() {
    let test = TestContext::builder().build().unwrap();
    cache_anime(&test, 2, 12).await;
    test.server
        .respond_always("CALENDAR", "297 CALENDAR\n1|1700000000|0\n2|1700000000|0");
    test.login().await.unwrap();

    run(&test, GetCalendar { force: false }).await.unwrap();
    assert_eq!(queued(&test).await, vec!["GetAnimeHttp_1"]);

    run(&test, GetCalendar { force: false }).await.unwrap();
    assert_eq!(test.server.count("CALENDAR"), 1);
    run(&test, GetCalendar { force: true }).await.unwrap();
    assert_eq!(test.server.count("CALENDAR"), 2);
}

#[tokio::test]
async fn test_updated_refreshes_only_known_anime() {
    let test = TestContext::builder().build().unwrap();
    cache_anime(&test, 5, 12).await;
    cache_anime(&test, 6, 12).await;
    test.server.reply("UPDATED", "243 UPDATED\n1|2|1700000000|5,7");
    test.login().await.unwrap();

    run(&test, GetUpdated { force: false }).await.unwrap();

    assert_eq!(queued(&test).await, vec!["GetAnimeHttp_5"]);
    let refresh = queued_request(&test, "GetAnimeHttp_5").await;
    assert!(matches!(refresh, CommandRequest::GetAnimeHttp(GetAnimeHttp { force: true, .. })));
    assert_eq!(test.server.count("UPDATED"), 1);
}

#[tokio::test]
async fn test_mylist_stats_are_saved() {
    let test = TestContext::builder().build().unwrap();
    test.server.reply(
        "MYLISTSTATS",
        "222 MYLIST STATS\n120|1500|1620|512000|0|0|0|0|0|0|1|2|80|1200|45|3|30000",
    );
    test.login().await.unwrap();

    run(&test, UpdateMyListStats { force: false }).await.unwrap();

    let stats = test.repos().mylist.stats().await.unwrap().unwrap();
    assert_eq!(stats.anime, 120);
    assert_eq!(stats.files, 1620);
    assert_eq!(stats.viewed_episodes, 1200);
}

#[tokio::test]
async fn test_hash_file_then_identifies() {
    let test = TestContext::builder().build().unwrap();
    let expected = test.hasher.add_file("/library/new.mkv", b"fresh episode");
    test.repos()
        .videos
        .save_video(&VideoLocal::new(3, "/library/new.mkv"))
        .await
        .unwrap();

    run(&test, HashFile { video_id: 3, force: false }).await.unwrap();

    let video = test.repos().videos.video(3).await.unwrap().unwrap();
    assert_eq!(video.hashes, Some(expected));
    assert_eq!(queued(&test).await, vec!["GetFile_3"]);
}

#[tokio::test]
async fn test_hash_of_vanished_file_is_a_no_op() {
    let test = TestContext::builder().build().unwrap();
    test.repos()
        .videos
        .save_video(&VideoLocal::new(4, "/library/gone.mkv"))
        .await
        .unwrap();

    run(&test, HashFile { video_id: 4, force: false }).await.unwrap();

    assert!(test.repos().videos.video(4).await.unwrap().unwrap().hashes.is_none());
    assert!(queued(&test).await.is_empty());
}

#[tokio::test]
async fn test_anime_images_queue_only_missing_downloads() {
    let test = TestContext::builder().build().unwrap();
    let images = &test.repos().images;
    images.register_image("1.jpg", Some(1)).await.unwrap();
    images.register_image("1-banner.jpg", Some(1)).await.unwrap();
    images.mark_downloaded("1-banner.jpg").await.unwrap();

    run(&test, DownloadAniDbImages { aid: 1, force: false })
        .await
        .unwrap();

    assert_eq!(queued(&test).await, vec!["DownloadImage_1.jpg"]);
}

#[tokio::test]
async fn test_download_image_marks_record() {
    let test = TestContext::builder().build().unwrap();
    test.repos().images.register_image("1.jpg", Some(1)).await.unwrap();

    run(
        &test,
        DownloadImage {
            file_name: "1.jpg".to_string(),
            force: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(test.images.downloads(), vec!["1.jpg"]);
    assert!(test.repos().images.image("1.jpg").await.unwrap().unwrap().downloaded);

    let err = run(
        &test,
        DownloadImage {
            file_name: "../1.jpg".to_string(),
            force: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_validate_images_requeues_missing_files() {
    let test = TestContext::builder().build().unwrap();
    let images = &test.repos().images;
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        images.register_image(name, None).await.unwrap();
    }
    images.mark_downloaded("a.jpg").await.unwrap();
    images.mark_downloaded("b.jpg").await.unwrap();
    test.images.add_existing("b.jpg");

    run(&test, ValidateAllImages {}).await.unwrap();

    assert_eq!(
        queued(&test).await,
        vec!["DownloadImage_a.jpg", "DownloadImage_c.jpg"]
    );
}

#[tokio::test]
async fn test_anime_summary_queues_unknown_characters() {
    let test = TestContext::builder().build().unwrap();
    cache_anime(&test, 4896, 0).await;
    test.server.reply(
        "ANIME",
        "230 ANIME\n4896|1995-1996|TV Series|Shinseiki Evangelion|Neon Genesis Evangelion|26|14|812764800|827971200|22068.jpg|863|12000|78,79",
    );
    test.server.reply("CHARACTER", "235 CHARACTER\n78|碇シンジ|Ikari Shinji|14545.jpg|4896,1,1234,1|1|1300000000|1|M");
    test.login().await.unwrap();

    // Character 78 becomes known before the summary lists it
    run(&test, GetCharacter { char_id: 78, force: false }).await.unwrap();
    run(&test, GetAnimeUdp { aid: 4896, force: true }).await.unwrap();

    let anime = test.repos().anime.anime(4896).await.unwrap().unwrap();
    assert_eq!(anime.title.as_deref(), Some("Shinseiki Evangelion"));
    assert_eq!(anime.episode_count, 26);
    // The HTTP document survives the summary
    assert_eq!(anime.xml, anime_xml(4896, "cached", 0));
    assert!(test.repos().images.image("22068.jpg").await.unwrap().is_some());
    assert_eq!(
        queued(&test).await,
        vec!["DownloadImage_14545.jpg", "GetCharacter_79"]
    );
    assert_eq!(test.server.sent_for("ANIME")[0].param("aid"), Some("4896"));
}

#[tokio::test]
async fn test_anime_summary_skips_cached_and_missing_anime() {
    let test = TestContext::builder().build().unwrap();
    cache_anime(&test, 1, 12).await;
    test.server.reply("ANIME", "330 NO SUCH ANIME");
    test.login().await.unwrap();

    run(&test, GetAnimeUdp { aid: 1, force: false }).await.unwrap();
    assert_eq!(test.server.count("ANIME"), 0);

    run(&test, GetAnimeUdp { aid: 2, force: false }).await.unwrap();
    assert_eq!(test.server.count("ANIME"), 1);
    assert!(test.repos().anime.anime(2).await.unwrap().is_none());
    assert!(queued(&test).await.is_empty());
}

#[tokio::test]
async fn test_character_is_saved_and_picture_queued() {
    let test = TestContext::builder().build().unwrap();
    test.server.reply(
        "CHARACTER",
        "235 CHARACTER\n78|碇シンジ|Ikari Shinji|14545.jpg|4896,1,1234,1'202,1,1234,1|1,2|1300000000|1|M",
    );
    test.login().await.unwrap();

    run(&test, GetCharacter { char_id: 78, force: false }).await.unwrap();

    let character = test.repos().characters.character(78).await.unwrap().unwrap();
    assert_eq!(character.name.as_deref(), Some("Ikari Shinji"));
    assert_eq!(character.kanji_name.as_deref(), Some("碇シンジ"));
    assert_eq!(character.anime_ids, vec![4896, 202]);
    assert_eq!(character.gender.as_deref(), Some("M"));
    assert!(test.repos().images.image("14545.jpg").await.unwrap().is_some());
    assert_eq!(queued(&test).await, vec!["DownloadImage_14545.jpg"]);

    // Known characters are not asked for again unless forced
    run(&test, GetCharacter { char_id: 78, force: false }).await.unwrap();
    assert_eq!(test.server.count("CHARACTER"), 1);
}

#[tokio::test]
async fn test_review_parts_are_joined() {
    let test = TestContext::builder().build().unwrap();
    test.server
        .reply("REVIEW", "234 REVIEW\n0|2|A slow start, ")
        .reply("REVIEW", "234 REVIEW\n1|2|then it never lets go.");
    test.login().await.unwrap();

    run(&test, GetReview { review_id: 55, force: false }).await.unwrap();

    let parts: Vec<String> = test
        .server
        .sent_for("REVIEW")
        .iter()
        .map(|d| d.param("part").unwrap_or_default().to_string())
        .collect();
    assert_eq!(parts, vec!["0", "1"]);
    let review = test.repos().reviews.review(55).await.unwrap().unwrap();
    assert_eq!(review.text, "A slow start, then it never lets go.");

    run(&test, GetReview { review_id: 55, force: false }).await.unwrap();
    assert_eq!(test.server.count("REVIEW"), 2);
}

#[tokio::test]
async fn test_missing_review_is_not_an_error() {
    let test = TestContext::builder().build().unwrap();
    test.server.reply("REVIEW", "334 NO SUCH REVIEW");
    test.login().await.unwrap();

    run(&test, GetReview { review_id: 9, force: false }).await.unwrap();

    assert!(test.repos().reviews.review(9).await.unwrap().is_none());
}

#[tokio::test]
async fn test_revoke_removes_stored_vote() {
    let test = TestContext::builder().build().unwrap();
    for (aid, kind) in [(4896, VoteKind::AnimePermanent), (5000, VoteKind::AnimeTemporary)] {
        test.repos()
            .votes
            .save_vote(&Vote { aid, kind, value: 8.0 })
            .await
            .unwrap();
    }
    test.server
        .reply("VOTE", "262 VOTE REVOKED\nAvatar|-1|1|4896")
        .reply("VOTE", "360 NO SUCH VOTE");
    test.login().await.unwrap();

    run(&test, RevokeVote { aid: 4896, kind: VoteKind::AnimePermanent })
        .await
        .unwrap();
    assert_eq!(test.server.sent_for("VOTE")[0].param("value"), Some("-1"));
    assert!(
        test.repos()
            .votes
            .vote(4896, VoteKind::AnimePermanent)
            .await
            .unwrap()
            .is_none()
    );

    // AniDB no longer knowing the vote also clears the local copy
    run(&test, RevokeVote { aid: 5000, kind: VoteKind::AnimeTemporary })
        .await
        .unwrap();
    assert!(test.repos().votes.votes().await.unwrap().is_empty());
}
