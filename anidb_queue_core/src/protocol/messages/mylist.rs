//! MyList messages: MYLISTADD, MYLISTDEL, MYLIST and MYLISTSTATS

use crate::protocol::error::Result;
use crate::protocol::messages::{
    AniDBCommand, AniDBResponse, RawResponse, field_str, field_u64, require_u64,
};

/// Which file a mylist command refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MyListTarget {
    Lid(u64),
    Fid(u64),
    Hash { size: u64, ed2k: String },
}

impl MyListTarget {
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Lid(lid) => vec![("lid", lid.to_string())],
            Self::Fid(fid) => vec![("fid", fid.to_string())],
            Self::Hash { size, ed2k } => {
                vec![("size", size.to_string()), ("ed2k", ed2k.to_lowercase())]
            }
        }
    }
}

/// MYLISTADD command, adding a file or editing its existing entry
#[derive(Debug, Clone)]
pub struct MyListAddCommand {
    pub target: MyListTarget,
    /// 0 unknown, 1 internal storage, 2 external storage, 3 deleted, 4 remote
    pub state: Option<u8>,
    pub viewed: Option<bool>,
    /// Unix seconds
    pub viewdate: Option<i64>,
    pub edit: bool,
}

impl MyListAddCommand {
    pub fn by_hash(size: u64, ed2k: &str) -> Self {
        Self::new(MyListTarget::Hash {
            size,
            ed2k: ed2k.to_string(),
        })
    }

    pub fn by_id(fid: u64) -> Self {
        Self::new(MyListTarget::Fid(fid))
    }

    fn new(target: MyListTarget) -> Self {
        Self {
            target,
            state: None,
            viewed: None,
            viewdate: None,
            edit: false,
        }
    }

    pub fn with_state(mut self, state: u8) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the watched flag and, when watched, the view date
    pub fn with_viewed(mut self, viewed: bool, viewdate: Option<i64>) -> Self {
        self.viewed = Some(viewed);
        self.viewdate = if viewed { viewdate } else { None };
        self
    }

    /// Turn the add into an edit of the existing entry
    pub fn edit(mut self) -> Self {
        self.edit = true;
        self
    }
}

impl AniDBCommand for MyListAddCommand {
    fn name(&self) -> &'static str {
        "MYLISTADD"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = self.target.params();
        if let Some(state) = self.state {
            params.push(("state", state.to_string()));
        }
        if let Some(viewed) = self.viewed {
            params.push(("viewed", if viewed { "1" } else { "0" }.to_string()));
        }
        if let Some(viewdate) = self.viewdate {
            params.push(("viewdate", viewdate.to_string()));
        }
        if self.edit {
            params.push(("edit", "1".to_string()));
        }
        params
    }
}

/// Response to MYLISTADD
#[derive(Debug, Clone)]
pub struct MyListAddResponse {
    pub code: u16,
    pub message: String,
    /// Entry id for 210 MYLIST ENTRY ADDED and 310 FILE ALREADY IN MYLIST
    pub lid: Option<u64>,
    /// Number of entries touched by 311 MYLIST ENTRY EDITED
    pub edited: Option<u64>,
}

impl MyListAddResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let f = raw.fields();
        let (lid, edited) = match raw.code {
            210 | 310 => (Some(require_u64(f, 0, "lid")?), None),
            311 => (None, field_u64(f, 0)),
            _ => (None, None),
        };
        Ok(Self {
            code: raw.code,
            message: raw.message.clone(),
            lid,
            edited,
        })
    }

    /// Added, already present, or edited
    pub fn is_recorded(&self) -> bool {
        matches!(self.code, 210 | 310 | 311)
    }
}

impl AniDBResponse for MyListAddResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// MYLISTDEL command
#[derive(Debug, Clone)]
pub struct MyListDelCommand {
    pub target: MyListTarget,
}

impl MyListDelCommand {
    pub fn by_hash(size: u64, ed2k: &str) -> Self {
        Self {
            target: MyListTarget::Hash {
                size,
                ed2k: ed2k.to_string(),
            },
        }
    }

    pub fn by_id(fid: u64) -> Self {
        Self {
            target: MyListTarget::Fid(fid),
        }
    }
}

impl AniDBCommand for MyListDelCommand {
    fn name(&self) -> &'static str {
        "MYLISTDEL"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        self.target.params()
    }
}

/// Response to MYLISTDEL; 211 MYLIST ENTRY DELETED or 411 NO SUCH MYLIST ENTRY
#[derive(Debug, Clone)]
pub struct MyListDelResponse {
    pub code: u16,
    pub message: String,
    pub deleted: u64,
}

impl MyListDelResponse {
    pub fn parse(raw: &RawResponse) -> Self {
        Self {
            code: raw.code,
            message: raw.message.clone(),
            deleted: if raw.code == 211 {
                field_u64(raw.fields(), 0).unwrap_or(1)
            } else {
                0
            },
        }
    }
}

impl AniDBResponse for MyListDelResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// MYLIST command fetching one entry
#[derive(Debug, Clone)]
pub struct MyListCommand {
    pub lid: u64,
}

impl AniDBCommand for MyListCommand {
    fn name(&self) -> &'static str {
        "MYLIST"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("lid", self.lid.to_string())]
    }
}

/// Response to MYLIST; 221 MYLIST or 321 NO SUCH ENTRY
#[derive(Debug, Clone, Default)]
pub struct MyListResponse {
    pub code: u16,
    pub message: String,
    pub lid: Option<u64>,
    pub fid: Option<u64>,
    pub eid: Option<u64>,
    pub aid: Option<u64>,
    pub gid: Option<u64>,
    pub added_at: Option<i64>,
    pub state: Option<u8>,
    /// 0 when unwatched
    pub viewed_at: Option<i64>,
    pub storage: Option<String>,
}

impl MyListResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 221 {
            let f = raw.fields();
            response.lid = Some(require_u64(f, 0, "lid")?);
            response.fid = field_u64(f, 1);
            response.eid = field_u64(f, 2);
            response.aid = field_u64(f, 3);
            response.gid = field_u64(f, 4);
            response.added_at = field_u64(f, 5).map(|v| v as i64);
            response.state = field_u64(f, 6).map(|v| v as u8);
            response.viewed_at = field_u64(f, 7).filter(|v| *v != 0).map(|v| v as i64);
            response.storage = field_str(f, 8);
        }
        Ok(response)
    }
}

impl AniDBResponse for MyListResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// MYLISTSTATS command
#[derive(Debug, Clone, Default)]
pub struct MyListStatsCommand;

impl AniDBCommand for MyListStatsCommand {
    fn name(&self) -> &'static str {
        "MYLISTSTATS"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Response to MYLISTSTATS; 222 MYLIST STATS
#[derive(Debug, Clone, Default)]
pub struct MyListStatsResponse {
    pub code: u16,
    pub message: String,
    pub anime: u64,
    pub episodes: u64,
    pub files: u64,
    /// Total size in MB
    pub size_mb: u64,
    pub viewed_episodes: u64,
    pub votes: u64,
    pub reviews: u64,
    pub viewed_minutes: u64,
}

impl MyListStatsResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 222 {
            let f = raw.fields();
            response.anime = require_u64(f, 0, "anime")?;
            response.episodes = field_u64(f, 1).unwrap_or_default();
            response.files = field_u64(f, 2).unwrap_or_default();
            response.size_mb = field_u64(f, 3).unwrap_or_default();
            response.viewed_episodes = field_u64(f, 13).unwrap_or_default();
            response.votes = field_u64(f, 14).unwrap_or_default();
            response.reviews = field_u64(f, 15).unwrap_or_default();
            response.viewed_minutes = field_u64(f, 16).unwrap_or_default();
        }
        Ok(response)
    }
}

impl AniDBResponse for MyListStatsResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mylistadd_encoding() {
        let cmd = MyListAddCommand::by_hash(1024, "ABCDEF")
            .with_state(1)
            .with_viewed(true, Some(1_700_000_000));
        assert_eq!(
            cmd.encode(),
            "MYLISTADD size=1024&ed2k=abcdef&state=1&viewed=1&viewdate=1700000000"
        );

        let edit = MyListAddCommand::by_hash(1024, "abcdef")
            .with_viewed(false, Some(1))
            .edit();
        assert_eq!(edit.encode(), "MYLISTADD size=1024&ed2k=abcdef&viewed=0&edit=1");
    }

    #[test]
    fn test_mylistadd_responses() {
        let added = MyListAddResponse::parse(&RawResponse::parse("210 MYLIST ENTRY ADDED\n987").unwrap())
            .unwrap();
        assert_eq!(added.lid, Some(987));
        assert!(added.is_recorded());

        let existing = MyListAddResponse::parse(
            &RawResponse::parse("310 FILE ALREADY IN MYLIST\n555|12|3|4|5|1700000000|1|0|||").unwrap(),
        )
        .unwrap();
        assert_eq!(existing.lid, Some(555));
        assert!(existing.is_recorded());

        let edited =
            MyListAddResponse::parse(&RawResponse::parse("311 MYLIST ENTRY EDITED\n1").unwrap()).unwrap();
        assert_eq!(edited.edited, Some(1));

        let missing = MyListAddResponse::parse(&RawResponse::parse("320 NO SUCH FILE").unwrap()).unwrap();
        assert!(!missing.is_recorded());
    }

    #[test]
    fn test_mylistdel() {
        assert_eq!(MyListDelCommand::by_id(42).encode(), "MYLISTDEL fid=42");

        let deleted = MyListDelResponse::parse(&RawResponse::parse("211 MYLIST ENTRY DELETED\n1").unwrap());
        assert_eq!(deleted.deleted, 1);
        let missing = MyListDelResponse::parse(&RawResponse::parse("411 NO SUCH MYLIST ENTRY").unwrap());
        assert_eq!(missing.deleted, 0);
    }

    #[test]
    fn test_mylist_entry() {
        let raw = RawResponse::parse("221 MYLIST\n555|12|3|4|5|1700000000|1|1700000500|shelf A|||").unwrap();
        let entry = MyListResponse::parse(&raw).unwrap();
        assert_eq!(entry.lid, Some(555));
        assert_eq!(entry.fid, Some(12));
        assert_eq!(entry.viewed_at, Some(1_700_000_500));
        assert_eq!(entry.storage.as_deref(), Some("shelf A"));
    }

    #[test]
    fn test_mylist_stats() {
        let raw = RawResponse::parse(
            "222 MYLIST STATS\n120|1500|1620|512000|0|0|0|0|0|0|1|2|80|1200|45|3|30000",
        )
        .unwrap();
        let stats = MyListStatsResponse::parse(&raw).unwrap();
        assert_eq!(stats.anime, 120);
        assert_eq!(stats.files, 1620);
        assert_eq!(stats.viewed_episodes, 1200);
        assert_eq!(stats.votes, 45);
        assert_eq!(stats.viewed_minutes, 30000);
    }
}
