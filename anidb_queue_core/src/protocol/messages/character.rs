//! CHARACTER command

use crate::protocol::error::Result;
use crate::protocol::messages::{
    AniDBCommand, AniDBResponse, RawResponse, field_str, field_u64, require_u64,
};

/// Separates the per-anime blocks of a character record
const ANIME_BLOCK_SEPARATOR: char = '\'';

#[derive(Debug, Clone)]
pub struct CharacterCommand {
    pub char_id: u64,
}

impl AniDBCommand for CharacterCommand {
    fn name(&self) -> &'static str {
        "CHARACTER"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("charid", self.char_id.to_string())]
    }
}

/// Response to CHARACTER; 235 CHARACTER or 335 NO SUCH CHARACTER
///
/// Field order: charid|kanji name|transcription|pic|anime blocks|episode list|last update|type|gender
///
/// Each anime block is `aid,appearance,creator id,is main seiyuu`.
#[derive(Debug, Clone, Default)]
pub struct CharacterResponse {
    pub code: u16,
    pub message: String,
    pub char_id: Option<u64>,
    pub kanji_name: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub anime_ids: Vec<u64>,
    /// Unix seconds
    pub last_update: Option<i64>,
    pub gender: Option<String>,
}

impl CharacterResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };
        if raw.code == 235 {
            let f = raw.fields();
            response.char_id = Some(require_u64(f, 0, "charid")?);
            response.kanji_name = field_str(f, 1);
            response.name = field_str(f, 2);
            response.picture = field_str(f, 3);
            response.anime_ids = field_str(f, 4)
                .map(|blocks| {
                    blocks
                        .split(ANIME_BLOCK_SEPARATOR)
                        .filter_map(|block| block.split(',').next()?.trim().parse().ok())
                        .collect()
                })
                .unwrap_or_default();
            response.last_update = field_u64(f, 6).map(|v| v as i64);
            response.gender = field_str(f, 8);
        }
        Ok(response)
    }
}

impl AniDBResponse for CharacterResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}
