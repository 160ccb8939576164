//! Response parsing
//!
//! A reply is split into a [`RawResponse`] (header plus `|`-separated data
//! lines) and then routed to the typed parser for the command that was sent.

use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::messages::{
    AniDBResponse, AnimeResponse, AuthResponse, CalendarResponse, CharacterResponse,
    EpisodeResponse, FileResponse, GroupResponse, GroupStatusResponse, LogoutResponse,
    MyListAddResponse, MyListDelResponse, MyListResponse, MyListStatsResponse, PongResponse,
    ReviewResponse, UpdatedResponse, VoteResponse, parse_response_fields, parse_response_header,
};

/// Header and data lines of a reply, before typing
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub code: u16,
    pub message: String,
    pub records: Vec<Vec<String>>,
}

impl RawResponse {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().filter(|l| !l.is_empty());
        let header = lines
            .next()
            .ok_or_else(|| ProtocolError::invalid_packet("Empty response"))?;
        let (code, message) = parse_response_header(header)?;
        Ok(Self {
            code,
            message,
            records: lines.map(parse_response_fields).collect(),
        })
    }

    /// Fields of the first data line
    pub fn fields(&self) -> &[String] {
        self.records.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl AniDBResponse for RawResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// Enumeration of all typed AniDB responses
#[derive(Debug, Clone)]
pub enum Response {
    Auth(AuthResponse),
    Logout(LogoutResponse),
    Pong(PongResponse),
    File(Box<FileResponse>),
    MyListAdd(MyListAddResponse),
    MyListDel(MyListDelResponse),
    MyList(Box<MyListResponse>),
    MyListStats(MyListStatsResponse),
    Episode(Box<EpisodeResponse>),
    Anime(Box<AnimeResponse>),
    Character(Box<CharacterResponse>),
    Review(ReviewResponse),
    Group(Box<GroupResponse>),
    GroupStatus(GroupStatusResponse),
    Calendar(CalendarResponse),
    Updated(UpdatedResponse),
    Vote(VoteResponse),
    /// Error codes and replies to commands without a typed parser
    Generic(RawResponse),
}

impl Response {
    fn inner(&self) -> &dyn AniDBResponse {
        match self {
            Response::Auth(r) => r,
            Response::Logout(r) => r,
            Response::Pong(r) => r,
            Response::File(r) => r.as_ref(),
            Response::MyListAdd(r) => r,
            Response::MyListDel(r) => r,
            Response::MyList(r) => r.as_ref(),
            Response::MyListStats(r) => r,
            Response::Episode(r) => r.as_ref(),
            Response::Anime(r) => r.as_ref(),
            Response::Character(r) => r.as_ref(),
            Response::Review(r) => r,
            Response::Group(r) => r.as_ref(),
            Response::GroupStatus(r) => r,
            Response::Calendar(r) => r,
            Response::Updated(r) => r,
            Response::Vote(r) => r,
            Response::Generic(r) => r,
        }
    }

    /// Get the response code
    pub fn code(&self) -> u16 {
        self.inner().code()
    }

    /// Get the response message
    pub fn message(&self) -> &str {
        self.inner().message()
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.inner().is_success()
    }

    /// Check if the response indicates an error
    pub fn is_error(&self) -> bool {
        self.inner().is_error()
    }

    /// Convert to a protocol error if this is an error response
    pub fn to_error(&self) -> Option<ProtocolError> {
        if let Response::Generic(raw) = self
            && raw.code == 555
        {
            let reason = raw
                .fields()
                .first()
                .cloned()
                .unwrap_or_else(|| raw.message.clone());
            return Some(ProtocolError::banned(reason));
        }
        ProtocolError::from_code(self.code(), self.message())
    }
}

/// Routes raw replies to the typed parser for the sent command
pub struct ResponseParser;

impl ResponseParser {
    /// Parse a decoded reply for `command` (the wire command name)
    pub fn parse(text: &str, command: &str) -> Result<Response> {
        let raw = RawResponse::parse(text)?;
        if raw.code >= 500 {
            return Ok(Response::Generic(raw));
        }

        let response = match (raw.code, command) {
            (_, "AUTH") => Response::Auth(AuthResponse::parse(&raw)?),
            (_, "LOGOUT") => Response::Logout(LogoutResponse {
                code: raw.code,
                message: raw.message.clone(),
            }),
            (300, "PING") => Response::Pong(PongResponse::parse(&raw)),
            (_, "FILE") => Response::File(Box::new(FileResponse::parse(&raw)?)),
            (_, "MYLISTADD") => Response::MyListAdd(MyListAddResponse::parse(&raw)?),
            (_, "MYLISTDEL") => Response::MyListDel(MyListDelResponse::parse(&raw)),
            (_, "MYLIST") => Response::MyList(Box::new(MyListResponse::parse(&raw)?)),
            (_, "MYLISTSTATS") => Response::MyListStats(MyListStatsResponse::parse(&raw)?),
            (_, "EPISODE") => Response::Episode(Box::new(EpisodeResponse::parse(&raw)?)),
            (_, "ANIME") => Response::Anime(Box::new(AnimeResponse::parse(&raw)?)),
            (_, "CHARACTER") => Response::Character(Box::new(CharacterResponse::parse(&raw)?)),
            (_, "REVIEW") => Response::Review(ReviewResponse::parse(&raw)?),
            (_, "GROUP") => Response::Group(Box::new(GroupResponse::parse(&raw)?)),
            (_, "GROUPSTATUS") => Response::GroupStatus(GroupStatusResponse::parse(&raw)?),
            (_, "CALENDAR") => Response::Calendar(CalendarResponse::parse(&raw)?),
            (_, "UPDATED") => Response::Updated(UpdatedResponse::parse(&raw)?),
            (_, "VOTE") => Response::Vote(VoteResponse::parse(&raw)),
            _ => Response::Generic(raw),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_records() {
        let raw = RawResponse::parse("225 GROUP STATUS\na|b\nc|d\n").unwrap();
        assert_eq!(raw.code, 225);
        assert_eq!(raw.message, "GROUP STATUS");
        assert_eq!(raw.records.len(), 2);
        assert_eq!(raw.fields(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_routes_by_command() {
        let response = ResponseParser::parse("220 FILE\n1|2|3|4|0|1|10|abc", "FILE").unwrap();
        assert!(matches!(response, Response::File(_)));
        assert!(response.is_success());

        let response = ResponseParser::parse("300 PONG", "PING").unwrap();
        assert!(matches!(response, Response::Pong(_)));

        let response = ResponseParser::parse("203 LOGGED OUT", "LOGOUT").unwrap();
        assert_eq!(response.code(), 203);
    }

    #[test]
    fn test_error_codes_are_generic() {
        let response = ResponseParser::parse("506 INVALID SESSION", "FILE").unwrap();
        assert!(matches!(response, Response::Generic(_)));
        assert!(response.is_error());
        assert!(matches!(
            response.to_error(),
            Some(ProtocolError::InvalidSession)
        ));
    }

    #[test]
    fn test_ban_reason_from_data_line() {
        let response = ResponseParser::parse("555 BANNED\nLeech", "FILE").unwrap();
        match response.to_error() {
            Some(ProtocolError::Banned { reason }) => assert_eq!(reason, "Leech"),
            other => panic!("expected ban, got {other:?}"),
        }
    }

    #[test]
    fn test_success_has_no_error() {
        let response = ResponseParser::parse("320 NO SUCH FILE", "FILE").unwrap();
        assert!(response.to_error().is_none());
    }
}
