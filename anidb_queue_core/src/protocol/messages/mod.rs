//! Typed AniDB UDP messages
//!
//! Requests implement [`AniDBCommand`]; replies are first split into a
//! [`RawResponse`] and then parsed into a typed [`Response`] variant chosen by
//! the request that produced them.

pub mod anime;
pub mod auth;
pub mod character;
pub mod command;
pub mod episode;
pub mod file;
pub mod group;
pub mod mylist;
pub mod response;
pub mod review;

pub use anime::{
    AnimeCommand, AnimeResponse, CalendarCommand, CalendarEntry, CalendarResponse, UpdatedCommand,
    UpdatedResponse, VoteCommand, VoteKind, VoteResponse,
};
pub use auth::{AuthCommand, AuthResponse, LogoutCommand, LogoutResponse, PingCommand, PongResponse};
pub use character::{CharacterCommand, CharacterResponse};
pub use command::Command;
pub use episode::{EpisodeCommand, EpisodeResponse};
pub use file::{FileCommand, FileResponse};
pub use group::{
    GroupCommand, GroupResponse, GroupStatusCommand, GroupStatusEntry, GroupStatusResponse,
};
pub use mylist::{
    MyListAddCommand, MyListAddResponse, MyListCommand, MyListDelCommand, MyListDelResponse,
    MyListResponse, MyListStatsCommand, MyListStatsResponse,
};
pub use response::{RawResponse, Response, ResponseParser};
pub use review::{ReviewCommand, ReviewResponse};

use crate::protocol::error::{ProtocolError, Result};
use std::fmt;

/// Field separator in reply data lines
pub const PARAM_SEPARATOR: char = '|';

/// A request as it goes on the wire: `NAME key=value&key=value`
pub trait AniDBCommand: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Parameters in wire order
    fn parameters(&self) -> Vec<(&'static str, String)>;

    /// Wire text without the session and tag parameters
    fn encode(&self) -> String {
        let mut line = self.name().to_string();
        for (i, (key, value)) in self.parameters().into_iter().enumerate() {
            line.push(if i == 0 { ' ' } else { '&' });
            line.push_str(key);
            line.push('=');
            line.push_str(&encode_value(&value));
        }
        line
    }

    /// Everything except the pre-login commands needs `s=`
    fn requires_auth(&self) -> bool {
        !matches!(
            self.name(),
            "PING" | "ENCRYPT" | "ENCODING" | "AUTH" | "VERSION"
        )
    }
}

/// A typed reply
pub trait AniDBResponse: fmt::Debug + Send + Sync {
    fn code(&self) -> u16;

    fn message(&self) -> &str;

    fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }

    fn is_error(&self) -> bool {
        self.code() >= 500
    }
}

/// Escape an outgoing parameter value
///
/// The server only requires `&` as `&amp;` and newlines as `<br />`.
pub fn encode_value(value: &str) -> String {
    value
        .replace('\r', "")
        .replace('&', "&amp;")
        .replace('\n', "<br />")
}

/// Undo the server's escaping in a reply field
///
/// Backticks stand for apostrophes; a field consisting of a lone `/` stands
/// for a pipe.
pub fn decode_value(value: &str) -> String {
    if value == "/" {
        return "|".to_string();
    }
    value
        .replace("<br />", "\n")
        .replace('`', "'")
        .replace("&amp;", "&")
}

/// Split `CODE message` off the first reply line
pub fn parse_response_header(line: &str) -> Result<(u16, String)> {
    let (code, message) = line.split_once(' ').unwrap_or((line, ""));
    if code.is_empty() {
        return Err(ProtocolError::invalid_packet("Empty response"));
    }
    let code = code
        .parse::<u16>()
        .map_err(|_| ProtocolError::invalid_packet(format!("Invalid response code: {code}")))?;
    Ok((code, message.to_string()))
}

/// Decoded fields of one data line
pub fn parse_response_fields(line: &str) -> Vec<String> {
    line.split(PARAM_SEPARATOR).map(decode_value).collect()
}

/// Numeric field at `idx`, `None` when absent, empty or not a number
pub fn field_u64(fields: &[String], idx: usize) -> Option<u64> {
    fields.get(idx).and_then(|f| f.parse().ok())
}

/// Non-empty text field at `idx`
pub fn field_str(fields: &[String], idx: usize) -> Option<String> {
    fields.get(idx).filter(|f| !f.is_empty()).cloned()
}

/// Fail with a malformed response error when a mandatory field is missing
pub(crate) fn require_u64(fields: &[String], idx: usize, name: &str) -> Result<u64> {
    field_u64(fields, idx)
        .ok_or_else(|| ProtocolError::malformed(format!("missing or invalid field '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_escaping() {
        assert_eq!(encode_value("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(encode_value("first\r\nsecond"), "first<br />second");
        assert_eq!(encode_value("P@ss w0rd!#"), "P@ss w0rd!#");
    }

    #[test]
    fn test_incoming_unescaping() {
        assert_eq!(decode_value("Kino`s Journey"), "Kino's Journey");
        assert_eq!(decode_value("a<br />b"), "a\nb");
        assert_eq!(decode_value("R&amp;D"), "R&D");
        assert_eq!(decode_value("/"), "|");
        assert_eq!(decode_value("[HorribleSubs]/1080p"), "[HorribleSubs]/1080p");
    }

    #[test]
    fn test_header_split() {
        assert_eq!(
            parse_response_header("220 FILE").unwrap(),
            (220, "FILE".to_string())
        );
        assert_eq!(parse_response_header("505").unwrap(), (505, String::new()));
        assert!(parse_response_header("").is_err());
        assert!(parse_response_header("FILE 220").is_err());
    }

    #[test]
    fn test_data_line_fields() {
        assert_eq!(
            parse_response_fields("312498|4896||Umi`s"),
            vec!["312498", "4896", "", "Umi's"]
        );
        assert_eq!(parse_response_fields(""), vec![""]);
    }

    #[test]
    fn test_field_helpers() {
        let fields = vec!["12".to_string(), String::new(), "abc".to_string()];
        assert_eq!(field_u64(&fields, 0), Some(12));
        assert_eq!(field_u64(&fields, 1), None);
        assert_eq!(field_u64(&fields, 2), None);
        assert_eq!(field_str(&fields, 2), Some("abc".to_string()));
        assert_eq!(field_str(&fields, 1), None);
        assert!(require_u64(&fields, 9, "fid").is_err());
    }
}
