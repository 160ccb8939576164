//! GROUP and GROUPSTATUS commands

use crate::protocol::error::Result;
use crate::protocol::messages::{
    AniDBCommand, AniDBResponse, RawResponse, field_str, field_u64, require_u64,
};

/// GROUP command for release group details
#[derive(Debug, Clone)]
pub struct GroupCommand {
    pub gid: u64,
}

impl AniDBCommand for GroupCommand {
    fn name(&self) -> &'static str {
        "GROUP"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("gid", self.gid.to_string())]
    }
}

/// Response to GROUP; 250 GROUP or 350 NO SUCH GROUP
///
/// Field order: gid|rating|votes|acount|fcount|name|short|irc channel|irc server|url|picname|...
#[derive(Debug, Clone, Default)]
pub struct GroupResponse {
    pub code: u16,
    pub message: String,
    pub gid: Option<u64>,
    pub rating: Option<u32>,
    pub votes: Option<u32>,
    pub anime_count: Option<u32>,
    pub file_count: Option<u32>,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub url: Option<String>,
    pub picture: Option<String>,
}

impl GroupResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 250 {
            let f = raw.fields();
            response.gid = Some(require_u64(f, 0, "gid")?);
            response.rating = field_u64(f, 1).map(|v| v as u32);
            response.votes = field_u64(f, 2).map(|v| v as u32);
            response.anime_count = field_u64(f, 3).map(|v| v as u32);
            response.file_count = field_u64(f, 4).map(|v| v as u32);
            response.name = field_str(f, 5);
            response.short_name = field_str(f, 6);
            response.url = field_str(f, 9);
            response.picture = field_str(f, 10);
        }
        Ok(response)
    }
}

impl AniDBResponse for GroupResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// GROUPSTATUS command listing which groups release an anime
#[derive(Debug, Clone)]
pub struct GroupStatusCommand {
    pub aid: u64,
}

impl AniDBCommand for GroupStatusCommand {
    fn name(&self) -> &'static str {
        "GROUPSTATUS"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("aid", self.aid.to_string())]
    }
}

/// One line of a GROUPSTATUS reply
///
/// Field order: gid|name|completion state|last episode|rating|votes|episode range
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStatusEntry {
    pub gid: u64,
    pub name: String,
    pub completion_state: u8,
    pub last_episode: u32,
    pub rating: Option<u32>,
    pub votes: Option<u32>,
    pub episode_range: Option<String>,
}

/// Response to GROUPSTATUS; 225 GROUP STATUS, 325 NO GROUPS FOUND or 330 NO SUCH ANIME
#[derive(Debug, Clone, Default)]
pub struct GroupStatusResponse {
    pub code: u16,
    pub message: String,
    pub groups: Vec<GroupStatusEntry>,
}

impl GroupStatusResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut groups = Vec::new();
        if raw.code == 225 {
            for f in &raw.records {
                groups.push(GroupStatusEntry {
                    gid: require_u64(f, 0, "gid")?,
                    name: field_str(f, 1).unwrap_or_default(),
                    completion_state: field_u64(f, 2).unwrap_or_default() as u8,
                    last_episode: field_u64(f, 3).unwrap_or_default() as u32,
                    rating: field_u64(f, 4).map(|v| v as u32),
                    votes: field_u64(f, 5).map(|v| v as u32),
                    episode_range: field_str(f, 6),
                });
            }
        }
        Ok(Self {
            code: raw.code,
            message: raw.message.clone(),
            groups,
        })
    }

    /// Highest episode number released by any group
    pub fn latest_episode(&self) -> Option<u32> {
        self.groups.iter().map(|g| g.last_episode).max()
    }
}

impl AniDBResponse for GroupStatusResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}
