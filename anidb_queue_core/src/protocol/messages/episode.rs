//! EPISODE command and response

use crate::protocol::error::Result;
use crate::protocol::messages::{
    AniDBCommand, AniDBResponse, RawResponse, field_str, field_u64, require_u64,
};

/// EPISODE command for querying episode information
#[derive(Debug, Clone)]
pub struct EpisodeCommand {
    pub eid: u64,
}

impl EpisodeCommand {
    pub fn new(eid: u64) -> Self {
        Self { eid }
    }
}

impl AniDBCommand for EpisodeCommand {
    fn name(&self) -> &'static str {
        "EPISODE"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("eid", self.eid.to_string())]
    }
}

/// Response to EPISODE; 240 EPISODE or 340 NO SUCH EPISODE
///
/// Field order: eid|aid|length|rating|votes|epno|eng|romaji|kanji|aired|type
#[derive(Debug, Clone, Default)]
pub struct EpisodeResponse {
    pub code: u16,
    pub message: String,
    pub eid: Option<u64>,
    pub aid: Option<u64>,
    /// Minutes
    pub length: Option<u32>,
    /// Rating scaled by 100
    pub rating: Option<u32>,
    pub votes: Option<u32>,
    pub epno: Option<String>,
    pub title_english: Option<String>,
    pub title_romaji: Option<String>,
    /// Unix seconds
    pub aired: Option<i64>,
}

impl EpisodeResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 240 {
            let f = raw.fields();
            response.eid = Some(require_u64(f, 0, "eid")?);
            response.aid = Some(require_u64(f, 1, "aid")?);
            response.length = field_u64(f, 2).map(|v| v as u32);
            response.rating = field_u64(f, 3).map(|v| v as u32);
            response.votes = field_u64(f, 4).map(|v| v as u32);
            response.epno = field_str(f, 5);
            response.title_english = field_str(f, 6);
            response.title_romaji = field_str(f, 7);
            response.aired = field_u64(f, 9).filter(|v| *v != 0).map(|v| v as i64);
        }
        Ok(response)
    }
}

impl AniDBResponse for EpisodeResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}
