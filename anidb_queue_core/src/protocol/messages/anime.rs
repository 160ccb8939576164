//! Anime-level queries: ANIME, CALENDAR, UPDATED and VOTE

use crate::protocol::error::Result;
use crate::protocol::messages::{
    AniDBCommand, AniDBResponse, RawResponse, field_str, field_u64, require_u64,
};
use serde::{Deserialize, Serialize};

/// Fields requested from ANIME, in reply order:
/// aid|year|type|romaji|english|episodes|specials|air date|end date|picname|rating|votes|character ids
const ANIME_AMASK: &str = "b0a0bac0008000";

/// ANIME command for the summary record of one anime
#[derive(Debug, Clone)]
pub struct AnimeCommand {
    pub aid: u64,
}

impl AniDBCommand for AnimeCommand {
    fn name(&self) -> &'static str {
        "ANIME"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("aid", self.aid.to_string()),
            ("amask", ANIME_AMASK.to_string()),
        ]
    }
}

/// Response to ANIME; 230 ANIME or 330 NO SUCH ANIME
#[derive(Debug, Clone, Default)]
pub struct AnimeResponse {
    pub code: u16,
    pub message: String,
    pub aid: Option<u64>,
    pub year: Option<String>,
    pub kind: Option<String>,
    pub title_romaji: Option<String>,
    pub title_english: Option<String>,
    pub episodes: Option<u32>,
    pub specials: Option<u32>,
    /// Unix seconds
    pub air_date: Option<i64>,
    pub end_date: Option<i64>,
    pub picture: Option<String>,
    /// Rating scaled by 100
    pub rating: Option<u32>,
    pub votes: Option<u32>,
    pub character_ids: Vec<u64>,
}

impl AnimeResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 230 {
            let f = raw.fields();
            let date = |idx| field_u64(f, idx).filter(|v| *v != 0).map(|v| v as i64);
            response.aid = Some(require_u64(f, 0, "aid")?);
            response.year = field_str(f, 1);
            response.kind = field_str(f, 2);
            response.title_romaji = field_str(f, 3);
            response.title_english = field_str(f, 4);
            response.episodes = field_u64(f, 5).map(|v| v as u32);
            response.specials = field_u64(f, 6).map(|v| v as u32);
            response.air_date = date(7);
            response.end_date = date(8);
            response.picture = field_str(f, 9);
            response.rating = field_u64(f, 10).map(|v| v as u32);
            response.votes = field_u64(f, 11).map(|v| v as u32);
            response.character_ids = field_str(f, 12)
                .map(|ids| ids.split(',').filter_map(|id| id.trim().parse().ok()).collect())
                .unwrap_or_default();
        }
        Ok(response)
    }
}

impl AniDBResponse for AnimeResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// CALENDAR command listing upcoming and recent airings
#[derive(Debug, Clone, Default)]
pub struct CalendarCommand;

impl AniDBCommand for CalendarCommand {
    fn name(&self) -> &'static str {
        "CALENDAR"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEntry {
    pub aid: u64,
    /// Unix seconds
    pub start_date: i64,
    pub date_flags: u32,
}

/// Response to CALENDAR; 297 CALENDAR or 397 CALENDAR EMPTY
#[derive(Debug, Clone, Default)]
pub struct CalendarResponse {
    pub code: u16,
    pub message: String,
    pub entries: Vec<CalendarEntry>,
}

impl CalendarResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut entries = Vec::new();
        if raw.code == 297 {
            for f in &raw.records {
                entries.push(CalendarEntry {
                    aid: require_u64(f, 0, "aid")?,
                    start_date: field_u64(f, 1).unwrap_or_default() as i64,
                    date_flags: field_u64(f, 2).unwrap_or_default() as u32,
                });
            }
        }
        Ok(Self {
            code: raw.code,
            message: raw.message.clone(),
            entries,
        })
    }
}

impl AniDBResponse for CalendarResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// UPDATED command listing anime changed since a point in time
#[derive(Debug, Clone)]
pub struct UpdatedCommand {
    /// Unix seconds; anime updated after this are returned
    pub since: i64,
}

impl AniDBCommand for UpdatedCommand {
    fn name(&self) -> &'static str {
        "UPDATED"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("entity", "1".to_string()), ("time", self.since.to_string())]
    }
}

/// Response to UPDATED; 243 UPDATED or 343 NO UPDATES
///
/// Field order: entity|total count|last update date|comma separated aids
#[derive(Debug, Clone, Default)]
pub struct UpdatedResponse {
    pub code: u16,
    pub message: String,
    pub total: u64,
    /// Unix seconds of the newest update in the list
    pub last_update: Option<i64>,
    pub anime_ids: Vec<u64>,
}

impl UpdatedResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 243 {
            let f = raw.fields();
            response.total = require_u64(f, 1, "count")?;
            response.last_update = field_u64(f, 2).map(|v| v as i64);
            response.anime_ids = field_str(f, 3)
                .map(|ids| ids.split(',').filter_map(|id| id.trim().parse().ok()).collect())
                .unwrap_or_default();
        }
        Ok(response)
    }
}

impl AniDBResponse for UpdatedResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// Vote category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    AnimePermanent,
    AnimeTemporary,
    Group,
}

impl VoteKind {
    fn wire_type(&self) -> u8 {
        match self {
            Self::AnimePermanent => 1,
            Self::AnimeTemporary => 2,
            Self::Group => 3,
        }
    }
}

/// VOTE command
#[derive(Debug, Clone)]
pub struct VoteCommand {
    pub id: u64,
    pub kind: VoteKind,
    /// 100..=1000, or -1 to revoke
    pub value: i32,
}

impl VoteCommand {
    /// Withdraw an earlier vote
    pub fn revoke(id: u64, kind: VoteKind) -> Self {
        Self { id, kind, value: -1 }
    }
}

impl AniDBCommand for VoteCommand {
    fn name(&self) -> &'static str {
        "VOTE"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("type", self.kind.wire_type().to_string()),
            ("id", self.id.to_string()),
            ("value", self.value.to_string()),
        ]
    }
}

/// Response to VOTE; 260-263 on success, 360-363 when refused
#[derive(Debug, Clone, Default)]
pub struct VoteResponse {
    pub code: u16,
    pub message: String,
    pub name: Option<String>,
    pub value: Option<i32>,
}

impl VoteResponse {
    pub fn parse(raw: &RawResponse) -> Self {
        let f = raw.fields();
        let accepted = (260..=263).contains(&raw.code);
        Self {
            code: raw.code,
            message: raw.message.clone(),
            name: if accepted { field_str(f, 0) } else { None },
            value: if accepted {
                f.get(1).and_then(|v| v.parse().ok())
            } else {
                None
            },
        }
    }

    pub fn is_accepted(&self) -> bool {
        (260..=263).contains(&self.code)
    }
}

impl AniDBResponse for VoteResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}
