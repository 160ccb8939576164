//! FILE command and response

use crate::protocol::error::Result;
use crate::protocol::messages::{
    AniDBCommand, AniDBResponse, RawResponse, field_str, field_u64, require_u64,
};

/// fmask: aid, eid, gid, lid, state | size, ed2k, md5, sha1, crc32
pub const FILE_FMASK: &str = "79F8000000";

/// amask: no anime fields, those come from the HTTP API
pub const FILE_AMASK: &str = "00000000";

/// How the file is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    ById(u64),
    ByHash { size: u64, ed2k: String },
}

/// FILE command for querying file information
#[derive(Debug, Clone)]
pub struct FileCommand {
    pub lookup: FileLookup,
}

impl FileCommand {
    /// Create a FILE command by file ID
    pub fn by_id(fid: u64) -> Self {
        Self {
            lookup: FileLookup::ById(fid),
        }
    }

    /// Create a FILE command by size and ED2K hash
    pub fn by_hash(size: u64, ed2k: &str) -> Self {
        Self {
            lookup: FileLookup::ByHash {
                size,
                ed2k: ed2k.to_lowercase(),
            },
        }
    }
}

impl AniDBCommand for FileCommand {
    fn name(&self) -> &'static str {
        "FILE"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = match &self.lookup {
            FileLookup::ById(fid) => vec![("fid", fid.to_string())],
            FileLookup::ByHash { size, ed2k } => {
                vec![("size", size.to_string()), ("ed2k", ed2k.clone())]
            }
        };
        params.push(("fmask", FILE_FMASK.to_string()));
        params.push(("amask", FILE_AMASK.to_string()));
        params
    }
}

/// Response to FILE; 220 FILE or 320 NO SUCH FILE
#[derive(Debug, Clone, Default)]
pub struct FileResponse {
    pub code: u16,
    pub message: String,
    pub fid: Option<u64>,
    pub aid: Option<u64>,
    pub eid: Option<u64>,
    pub gid: Option<u64>,
    /// MyList ID, 0 when not in mylist
    pub lid: Option<u64>,
    pub state: Option<u32>,
    pub size: Option<u64>,
    pub ed2k: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub crc32: Option<String>,
}

impl FileResponse {
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            ..Default::default()
        };

        if raw.code == 220 {
            let f = raw.fields();
            response.fid = Some(require_u64(f, 0, "fid")?);
            response.aid = field_u64(f, 1);
            response.eid = field_u64(f, 2);
            response.gid = field_u64(f, 3);
            response.lid = field_u64(f, 4).filter(|lid| *lid != 0);
            response.state = field_u64(f, 5).map(|s| s as u32);
            response.size = field_u64(f, 6);
            response.ed2k = field_str(f, 7);
            response.md5 = field_str(f, 8);
            response.sha1 = field_str(f, 9);
            response.crc32 = field_str(f, 10);
        }

        Ok(response)
    }
}

impl AniDBResponse for FileResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}
