//! AniDB HTTP API
//!
//! Fetches anime, mylist and vote documents. Requests are only ever issued by
//! the session actor, which applies the rate gate and ban detection around
//! [`AniDbHttpApi::fetch`].

use crate::config::QueueClientConfig;
use crate::credentials::SecureString;
use crate::error::{ProtocolError, Result, ValidationError};
use crate::protocol::messages::VoteKind;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP API protocol version
const HTTP_PROTOVER: &str = "1";

/// Marker AniDB puts in the body of a ban page
const BAN_MARKER: &str = ">banned<";

/// One HTTP API request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRequest {
    Anime { aid: u64 },
    MyList,
    Votes,
}

impl HttpRequest {
    /// `request=` value on the query string
    pub fn name(&self) -> &'static str {
        match self {
            HttpRequest::Anime { .. } => "anime",
            HttpRequest::MyList => "mylist",
            HttpRequest::Votes => "votes",
        }
    }

    pub fn needs_credentials(&self) -> bool {
        !matches!(self, HttpRequest::Anime { .. })
    }
}

/// Account credentials for the user-scoped requests
#[derive(Debug, Clone)]
pub struct HttpCredentials {
    pub username: String,
    pub password: SecureString,
}

/// Raw access to the AniDB HTTP API
#[async_trait]
pub trait AniDbHttpApi: Send + Sync {
    /// Fetch the response body of `request`
    async fn fetch(
        &self,
        request: &HttpRequest,
        credentials: Option<&HttpCredentials>,
    ) -> Result<String>;
}

/// [`AniDbHttpApi`] over reqwest
pub struct ReqwestHttpApi {
    client: reqwest::Client,
    base_url: String,
    client_name: String,
    client_version: String,
    timeout: Duration,
}

impl ReqwestHttpApi {
    pub fn new(config: &QueueClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http.request_timeout())
            .gzip(true)
            .build()
            .map_err(|e| ProtocolError::other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.anidb.http_base_url.clone(),
            client_name: config.anidb.client_name.clone(),
            client_version: config.anidb.client_version.clone(),
            timeout: config.http.request_timeout(),
        })
    }

    fn url(
        &self,
        request: &HttpRequest,
        credentials: Option<&HttpCredentials>,
    ) -> Result<reqwest::Url> {
        let mut params: Vec<(&str, String)> = vec![
            ("request", request.name().to_string()),
            ("client", self.client_name.clone()),
            ("clientver", self.client_version.clone()),
            ("protover", HTTP_PROTOVER.to_string()),
        ];
        if let HttpRequest::Anime { aid } = request {
            params.push(("aid", aid.to_string()));
        }
        if request.needs_credentials() {
            let creds = credentials.ok_or_else(|| ValidationError::missing_credentials("username"))?;
            params.push(("user", creds.username.clone()));
            params.push(("pass", creds.password.expose_secret().to_string()));
        }

        reqwest::Url::parse_with_params(&self.base_url, &params).map_err(|e| {
            ValidationError::invalid_configuration(&format!(
                "invalid HTTP API url {}: {e}",
                self.base_url
            ))
            .into()
        })
    }
}

#[async_trait]
impl AniDbHttpApi for ReqwestHttpApi {
    async fn fetch(
        &self,
        request: &HttpRequest,
        credentials: Option<&HttpCredentials>,
    ) -> Result<String> {
        let url = self.url(request, credentials)?;
        debug!("HTTP API request={}", request.name());

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProtocolError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                ProtocolError::network(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            warn!("HTTP API answered {status} for request={}", request.name());
            return Err(ProtocolError::network(format!("HTTP API returned {status}")).into());
        }
        if !status.is_success() {
            return Err(ProtocolError::other(format!("HTTP API returned {status}")).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProtocolError::network(format!("failed to read HTTP body: {e}")))?;
        Ok(body)
    }
}

/// Whether a response body is AniDB's ban page
pub fn is_ban_page(body: &str) -> bool {
    body.contains(BAN_MARKER)
}

/// Text of an `<error>` document, if the body is one
pub fn error_message(body: &str) -> Option<String> {
    let error: ErrorXml = document(body, "error").ok()?;
    Some(error.text.unwrap_or_default())
}

/// Name of the first element, skipping the declaration and comments
fn root_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) | Event::Empty(e) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Deserialize a document whose root element must be `<root>`
fn document<T: DeserializeOwned>(xml: &str, root: &str) -> Result<T> {
    if root_name(xml).as_deref() != Some(root) {
        return Err(ProtocolError::malformed(format!("document has no <{root}> element")).into());
    }
    let parsed = quick_xml::de::from_str(xml).map_err(ProtocolError::from)?;
    Ok(parsed)
}

fn number<T: std::str::FromStr>(text: Option<&str>) -> Option<T> {
    text?.trim().parse().ok()
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

// Document shapes. Only the elements the commands consume are declared;
// everything else in a document is skipped.

#[derive(Debug, Deserialize)]
struct ErrorXml {
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnimeXml {
    #[serde(rename = "@id")]
    id: Option<String>,
    episodecount: Option<String>,
    titles: Option<TitlesXml>,
    picture: Option<String>,
    episodes: Option<EpisodesXml>,
    relatedanime: Option<RelatedXml>,
}

#[derive(Debug, Deserialize)]
struct TitlesXml {
    #[serde(rename = "title", default)]
    titles: Vec<TitleXml>,
}

#[derive(Debug, Deserialize)]
struct TitleXml {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodesXml {
    #[serde(rename = "episode", default)]
    episodes: Vec<EpisodeXml>,
}

#[derive(Debug, Deserialize)]
struct EpisodeXml {
    #[serde(rename = "@id")]
    id: Option<String>,
    epno: Option<EpNoXml>,
}

#[derive(Debug, Deserialize)]
struct EpNoXml {
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedXml {
    #[serde(rename = "anime", default)]
    anime: Vec<RelatedAnimeXml>,
}

#[derive(Debug, Deserialize)]
struct RelatedAnimeXml {
    #[serde(rename = "@id")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MyListXml {
    #[serde(rename = "mylistitem", default)]
    items: Vec<MyListItemXml>,
}

#[derive(Debug, Deserialize)]
struct MyListItemXml {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@fid")]
    fid: Option<String>,
    #[serde(rename = "@aid")]
    aid: Option<String>,
    #[serde(rename = "@eid")]
    eid: Option<String>,
    state: Option<String>,
    viewdate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VotesXml {
    anime: Option<VoteListXml>,
    animetemporary: Option<VoteListXml>,
}

#[derive(Debug, Deserialize)]
struct VoteListXml {
    #[serde(rename = "vote", default)]
    votes: Vec<VoteXml>,
}

#[derive(Debug, Deserialize)]
struct VoteXml {
    #[serde(rename = "@aid")]
    aid: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

/// Fields of an anime document the queue acts on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimeDocument {
    pub aid: u64,
    pub episode_count: Option<u32>,
    pub main_title: Option<String>,
    /// Cover image file name
    pub picture: Option<String>,
    /// (eid, epno) of every listed episode
    pub episodes: Vec<(u64, String)>,
    /// Sequels, prequels and other related anime
    pub related: Vec<u64>,
}

impl AnimeDocument {
    /// Episodes with a plain numeric epno; specials, credits and trailers excluded
    pub fn regular_episodes(&self) -> u32 {
        self.episodes
            .iter()
            .filter(|(_, epno)| epno.parse::<u32>().is_ok())
            .count() as u32
    }
}

/// Parse an `<anime>` document
pub fn parse_anime(xml: &str) -> Result<AnimeDocument> {
    let anime: AnimeXml = document(xml, "anime")?;
    let aid = number(anime.id.as_deref())
        .ok_or_else(|| ProtocolError::malformed("anime element has no id"))?;

    let main_title = anime
        .titles
        .map(|t| t.titles)
        .unwrap_or_default()
        .into_iter()
        .find(|t| t.kind.as_deref() == Some("main"))
        .and_then(|t| non_empty(t.text));

    let episodes = anime
        .episodes
        .map(|list| list.episodes)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|ep| {
            let eid = number(ep.id.as_deref())?;
            let epno = ep.epno.and_then(|n| non_empty(n.text)).unwrap_or_default();
            Some((eid, epno))
        })
        .collect();

    let related = anime
        .relatedanime
        .map(|list| list.anime)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| number(a.id.as_deref()))
        .collect();

    Ok(AnimeDocument {
        aid,
        episode_count: number(anime.episodecount.as_deref()),
        main_title,
        picture: non_empty(anime.picture),
        episodes,
        related,
    })
}

/// One entry of the mylist document
#[derive(Debug, Clone, PartialEq)]
pub struct MyListItem {
    pub lid: u64,
    pub fid: u64,
    pub aid: Option<u64>,
    pub eid: Option<u64>,
    pub state: Option<u8>,
    pub viewed_at: Option<DateTime<Utc>>,
}

/// Parse a `<mylist>` document
pub fn parse_mylist(xml: &str) -> Result<Vec<MyListItem>> {
    let mylist: MyListXml = document(xml, "mylist")?;
    let items = mylist
        .items
        .into_iter()
        .filter_map(|item| {
            Some(MyListItem {
                lid: number(item.id.as_deref())?,
                fid: number(item.fid.as_deref())?,
                aid: number(item.aid.as_deref()),
                eid: number(item.eid.as_deref()),
                state: number(item.state.as_deref()),
                viewed_at: non_empty(item.viewdate).as_deref().and_then(parse_date),
            })
        })
        .collect();
    Ok(items)
}

/// One anime vote of the votes document
#[derive(Debug, Clone, PartialEq)]
pub struct UserVote {
    pub aid: u64,
    pub kind: VoteKind,
    /// Rating on the 1.00 to 10.00 scale
    pub value: f64,
}

/// Parse a `<votes>` document; episode votes are ignored
pub fn parse_votes(xml: &str) -> Result<Vec<UserVote>> {
    let votes: VotesXml = document(xml, "votes")?;

    let mut result = Vec::new();
    for (list, kind) in [
        (votes.anime, VoteKind::AnimePermanent),
        (votes.animetemporary, VoteKind::AnimeTemporary),
    ] {
        for vote in list.map(|l| l.votes).unwrap_or_default() {
            let aid = number(vote.aid.as_deref());
            let value = number::<f64>(vote.value.as_deref());
            if let (Some(aid), Some(value)) = (aid, value) {
                result.push(UserVote { aid, kind, value });
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANIME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<anime id="4896" restricted="false">
  <type>TV Series</type>
  <episodecount>26</episodecount>
  <titles>
    <title xml:lang="x-jat" type="main">Shinseiki Evangelion</title>
    <title xml:lang="en" type="official">Neon Genesis Evangelion</title>
  </titles>
  <relatedanime>
    <anime id="4897" type="Alternative Setting">Evangelion: Death</anime>
    <anime id="202" type="Sequel">End of Evangelion</anime>
  </relatedanime>
  <picture>22068.jpg</picture>
  <episodes>
    <episode id="74795" update="2011-07-01">
      <epno type="1">1</epno>
      <length>25</length>
      <title xml:lang="en">Angel Attack</title>
    </episode>
    <episode id="74796" update="2011-07-01">
      <epno type="1">2</epno>
    </episode>
  </episodes>
</anime>"#;

    #[test]
    fn test_parse_anime_document() {
        let doc = parse_anime(ANIME).unwrap();
        assert_eq!(doc.aid, 4896);
        assert_eq!(doc.episode_count, Some(26));
        assert_eq!(doc.main_title.as_deref(), Some("Shinseiki Evangelion"));
        assert_eq!(doc.picture.as_deref(), Some("22068.jpg"));
        assert_eq!(
            doc.episodes,
            vec![(74795, "1".to_string()), (74796, "2".to_string())]
        );
        assert_eq!(doc.related, vec![4897, 202]);
        assert_eq!(doc.regular_episodes(), 2);
    }

    #[test]
    fn test_parse_anime_without_root_is_malformed() {
        assert!(parse_anime("<error>Anime not found</error>").is_err());
    }

    #[test]
    fn test_ban_page_detection() {
        assert!(is_ban_page("<error code=\"500\">banned</error>"));
        assert!(!is_ban_page(ANIME));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message("<error>Anime not found</error>").as_deref(),
            Some("Anime not found")
        );
        assert_eq!(error_message(ANIME), None);
    }

    #[test]
    fn test_parse_mylist() {
        let xml = r#"<mylist uid="1">
  <mylistitem id="100" aid="4896" eid="74795" fid="312498" updated="2020-01-01">
    <state>1</state>
    <viewdate>2021-03-04T10:00:00+00:00</viewdate>
  </mylistitem>
  <mylistitem id="101" aid="4896" eid="74796" fid="312499">
    <state>1</state>
  </mylistitem>
  <mylistitem aid="1"/>
</mylist>"#;
        let items = parse_mylist(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].lid, 100);
        assert_eq!(items[0].fid, 312498);
        assert!(items[0].viewed_at.is_some());
        assert_eq!(items[1].viewed_at, None);
        assert_eq!(items[1].state, Some(1));
    }

    #[test]
    fn test_parse_votes_skips_episode_votes() {
        let xml = r#"<votes>
  <anime><vote aid="4896" date="2020-01-01">8.50</vote></anime>
  <animetemporary><vote aid="1234">7.00</vote></animetemporary>
  <episode><vote eid="74795">9.00</vote></episode>
</votes>"#;
        let votes = parse_votes(xml).unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].aid, 4896);
        assert_eq!(votes[0].kind, VoteKind::AnimePermanent);
        assert_eq!(votes[1].kind, VoteKind::AnimeTemporary);
        assert!((votes[1].value - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_related_anime_titles_are_not_the_main_title() {
        let xml = r#"<anime id="4896">
  <relatedanime>
    <anime id="202" type="Sequel"><title type="main">End of Evangelion</title></anime>
  </relatedanime>
  <titles>
    <title xml:lang="en" type="official">Neon Genesis Evangelion</title>
  </titles>
</anime>"#;
        let doc = parse_anime(xml).unwrap();
        assert_eq!(doc.main_title, None);
        assert_eq!(doc.related, vec![202]);

        // Only the document root is the anime being described
        let with_main = ANIME.replace("Evangelion: Death", "<title type=\"main\">Death</title>");
        let doc = parse_anime(&with_main).unwrap();
        assert_eq!(doc.aid, 4896);
        assert_eq!(doc.main_title.as_deref(), Some("Shinseiki Evangelion"));
    }

    #[test]
    fn test_entities_and_cdata_are_decoded() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- generated -->
<anime id="1">
  <titles><title type="main">Tom &amp; Jerry &lt;3</title></titles>
  <picture><![CDATA[1 & 2.jpg]]></picture>
</anime>"#;
        let doc = parse_anime(xml).unwrap();
        assert_eq!(doc.main_title.as_deref(), Some("Tom & Jerry <3"));
        assert_eq!(doc.picture.as_deref(), Some("1 & 2.jpg"));
        assert!(doc.episodes.is_empty());
    }

    #[test]
    fn test_documents_must_have_the_expected_root() {
        let err = parse_votes("<mylist uid=\"1\"></mylist>").unwrap_err();
        assert!(err.to_string().contains("<votes>"));
        assert!(parse_mylist("not xml at all").is_err());
        assert_eq!(error_message("<error/>").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_user_requests_need_credentials() {
        let api = ReqwestHttpApi::new(&QueueClientConfig::default()).unwrap();
        assert!(api.url(&HttpRequest::MyList, None).is_err());

        let url = api.url(&HttpRequest::Anime { aid: 4896 }, None).unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("request=anime"));
        assert!(query.contains("aid=4896"));
        assert!(!query.contains("user="));
    }
}
