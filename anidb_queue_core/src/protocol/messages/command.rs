//! Command enumeration
//!
//! [`Command`] is the single request type the session actor accepts, so the
//! actor can log, tag and rate-limit requests uniformly.

use crate::protocol::messages::{
    AniDBCommand, AnimeCommand, AuthCommand, CalendarCommand, CharacterCommand, EpisodeCommand,
    FileCommand, GroupCommand, GroupStatusCommand, LogoutCommand, MyListAddCommand, MyListCommand,
    MyListDelCommand, MyListStatsCommand, PingCommand, ReviewCommand, UpdatedCommand, VoteCommand,
};

/// Enumeration of all supported AniDB commands
#[derive(Debug, Clone)]
pub enum Command {
    Auth(AuthCommand),
    Logout(LogoutCommand),
    Ping(PingCommand),
    File(FileCommand),
    MyListAdd(MyListAddCommand),
    MyListDel(MyListDelCommand),
    MyList(MyListCommand),
    MyListStats(MyListStatsCommand),
    Episode(EpisodeCommand),
    Anime(AnimeCommand),
    Character(CharacterCommand),
    Review(ReviewCommand),
    Group(GroupCommand),
    GroupStatus(GroupStatusCommand),
    Calendar(CalendarCommand),
    Updated(UpdatedCommand),
    Vote(VoteCommand),
}

impl Command {
    fn inner(&self) -> &dyn AniDBCommand {
        match self {
            Command::Auth(c) => c,
            Command::Logout(c) => c,
            Command::Ping(c) => c,
            Command::File(c) => c,
            Command::MyListAdd(c) => c,
            Command::MyListDel(c) => c,
            Command::MyList(c) => c,
            Command::MyListStats(c) => c,
            Command::Episode(c) => c,
            Command::Anime(c) => c,
            Command::Character(c) => c,
            Command::Review(c) => c,
            Command::Group(c) => c,
            Command::GroupStatus(c) => c,
            Command::Calendar(c) => c,
            Command::Updated(c) => c,
            Command::Vote(c) => c,
        }
    }

    /// Wire command name
    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    /// Whether the session key must be attached
    pub fn requires_auth(&self) -> bool {
        self.inner().requires_auth()
    }

    pub fn is_ping(&self) -> bool {
        matches!(self, Command::Ping(_))
    }

    /// Encode with the session key appended when the command needs one
    pub fn encode(&self, session: Option<&str>) -> String {
        let body = self.inner().encode();
        match session {
            Some(s) if self.requires_auth() => {
                if body.contains(' ') {
                    format!("{body}&s={s}")
                } else {
                    format!("{body} s={s}")
                }
            }
            _ => body,
        }
    }

    /// Encoded form safe for logs
    pub fn redacted(&self) -> String {
        match self {
            Command::Auth(auth) => format!(
                "AUTH user={}&pass=***&client={}&clientver={}",
                auth.user, auth.client, auth.clientver
            ),
            _ => self.inner().encode(),
        }
    }
}
