//! Session state owned by the session actor

use crate::error::BanSource;
use crate::session::rate_gate::RateGate;
use chrono::{DateTime, Utc};

/// The logical connection to AniDB
///
/// Exactly one instance exists per [`SessionClient`](crate::session::SessionClient),
/// inside its actor task.
#[derive(Debug)]
pub struct SessionState {
    session_key: Option<String>,
    pub udp_ban: Option<DateTime<Utc>>,
    pub http_ban: Option<DateTime<Utc>>,
    pub invalid_session: bool,
    pub network_available: bool,
    pub last_error: Option<String>,
    pub gate: RateGate,
}

impl SessionState {
    pub fn new(gate: RateGate) -> Self {
        Self {
            session_key: None,
            udp_ban: None,
            http_ban: None,
            invalid_session: false,
            network_available: true,
            last_error: None,
            gate,
        }
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session_key.is_some()
    }

    /// Store a freshly issued session key
    pub fn begin(&mut self, key: String) {
        self.session_key = Some(key);
        self.invalid_session = false;
        self.last_error = None;
    }

    /// Forget the session key
    pub fn end(&mut self) {
        self.session_key = None;
    }

    /// The server rejected our key; the next request logs in again
    pub fn invalidate(&mut self) {
        self.session_key = None;
        self.invalid_session = true;
    }

    pub fn mark_banned(&mut self, source: BanSource, at: DateTime<Utc>) {
        let slot = match source {
            BanSource::Udp => &mut self.udp_ban,
            BanSource::Http => &mut self.http_ban,
        };
        if slot.is_none() {
            *slot = Some(at);
        }
    }

    pub fn clear_bans(&mut self) {
        self.udp_ban = None;
        self.http_ban = None;
    }

    pub fn is_banned(&self, source: BanSource) -> bool {
        match source {
            BanSource::Udp => self.udp_ban.is_some(),
            BanSource::Http => self.http_ban.is_some(),
        }
    }

    pub fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            logged_in: self.is_logged_in(),
            udp_banned: self.udp_ban.is_some(),
            http_banned: self.http_ban.is_some(),
            ban_time: match (self.udp_ban, self.http_ban) {
                (Some(u), Some(h)) => Some(u.min(h)),
                (u, h) => u.or(h),
            },
            invalid_session: self.invalid_session,
            network_available: self.network_available,
            last_error: self.last_error.clone(),
        }
    }
}

/// Read-only view of the session for status reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub logged_in: bool,
    pub udp_banned: bool,
    pub http_banned: bool,
    /// When the earliest active ban was detected
    pub ban_time: Option<DateTime<Utc>>,
    pub invalid_session: bool,
    pub network_available: bool,
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn is_banned(&self) -> bool {
        self.udp_banned || self.http_banned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state() -> SessionState {
        SessionState::new(RateGate::new(Duration::from_secs(2), Duration::from_secs(1)))
    }

    #[test]
    fn test_login_logout_cycle() {
        let mut state = state();
        assert!(!state.is_logged_in());

        state.invalidate();
        assert!(state.snapshot().invalid_session);

        state.begin("key".to_string());
        assert!(state.is_logged_in());
        assert_eq!(state.session_key(), Some("key"));
        assert!(!state.snapshot().invalid_session);

        state.end();
        assert!(!state.is_logged_in());
        assert!(state.session_key().is_none());
    }

    #[test]
    fn test_ban_is_sticky_and_keeps_first_time() {
        let mut state = state();
        state.begin("key".to_string());
        let first = Utc::now();
        state.mark_banned(BanSource::Udp, first);
        state.mark_banned(BanSource::Udp, first + chrono::Duration::minutes(5));

        let status = state.snapshot();
        assert!(status.is_banned());
        assert!(status.logged_in);
        assert_eq!(status.ban_time, Some(first));

        state.clear_bans();
        assert!(!state.snapshot().is_banned());
    }

    #[test]
    fn test_ban_time_is_earliest_of_both_sources() {
        let mut state = state();
        let early = Utc::now() - chrono::Duration::hours(1);
        state.mark_banned(BanSource::Udp, Utc::now());
        state.mark_banned(BanSource::Http, early);
        assert_eq!(state.snapshot().ban_time, Some(early));
    }
}
