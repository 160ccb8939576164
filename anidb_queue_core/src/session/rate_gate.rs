//! Minimum spacing between outbound AniDB messages

use crate::config::RateLimitConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Rate-limit class of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateTier {
    /// Ordinary commands
    Long,
    /// Lightweight, frequent lookups such as FILE and PING
    Short,
}

/// Which AniDB API a message went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Udp,
    Http,
}

/// Timestamps of the last outbound messages and the delays derived from them
///
/// UDP waits are measured against the last message of any kind, so both tiers
/// share one clock. HTTP waits are measured against the last HTTP message.
/// The gate holds no lock; its owner serializes access.
#[derive(Debug, Clone)]
pub struct RateGate {
    long_delay: Duration,
    short_delay: Duration,
    last_any: Option<Instant>,
    last_udp: Option<Instant>,
    last_http: Option<Instant>,
    last_ping: Option<Instant>,
    last_non_ping: Option<Instant>,
}

impl RateGate {
    pub fn new(long_delay: Duration, short_delay: Duration) -> Self {
        Self {
            long_delay,
            short_delay,
            last_any: None,
            last_udp: None,
            last_http: None,
            last_ping: None,
            last_non_ping: None,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.long_delay(), config.short_delay())
    }

    pub fn delay_for(&self, tier: RateTier) -> Duration {
        match tier {
            RateTier::Long => self.long_delay,
            RateTier::Short => self.short_delay,
        }
    }

    /// Time still to wait before a `tier` message may go out on `channel`
    pub fn required_wait(&self, tier: RateTier, channel: Channel) -> Duration {
        let reference = match channel {
            Channel::Udp => self.last_any,
            Channel::Http => self.last_http,
        };
        match reference {
            Some(last) => (last + self.delay_for(tier)).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Sleep until a `tier` message may be sent
    pub async fn wait_until_ready(&self, tier: RateTier, channel: Channel) {
        let wait = self.required_wait(tier, channel);
        if !wait.is_zero() {
            debug!("Rate gate: waiting {wait:?} before next {channel:?} {tier:?} message");
            sleep(wait).await;
        }
    }

    /// Record a message as sent now; call immediately before dispatch
    pub fn record_sent(&mut self, channel: Channel, is_ping: bool) {
        let now = Instant::now();
        self.last_any = Some(now);
        match channel {
            Channel::Udp => self.last_udp = Some(now),
            Channel::Http => self.last_http = Some(now),
        }
        if is_ping {
            self.last_ping = Some(now);
        } else {
            self.last_non_ping = Some(now);
        }
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_any
    }

    pub fn since_last_udp(&self) -> Option<Duration> {
        self.last_udp.map(|t| t.elapsed())
    }

    pub fn since_last_http(&self) -> Option<Duration> {
        self.last_http.map(|t| t.elapsed())
    }

    pub fn since_last_ping(&self) -> Option<Duration> {
        self.last_ping.map(|t| t.elapsed())
    }

    pub fn since_last_non_ping(&self) -> Option<Duration> {
        self.last_non_ping.map(|t| t.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RateGate {
        RateGate::new(Duration::from_millis(2500), Duration::from_millis(1250))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_needs_no_wait() {
        let gate = gate();
        assert_eq!(gate.required_wait(RateTier::Long, Channel::Udp), Duration::ZERO);

        let start = Instant::now();
        gate.wait_until_ready(RateTier::Long, Channel::Udp).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiers_share_one_clock() {
        let mut gate = gate();
        gate.record_sent(Channel::Udp, false);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(
            gate.required_wait(RateTier::Short, Channel::Udp),
            Duration::from_millis(250)
        );
        assert_eq!(
            gate.required_wait(RateTier::Long, Channel::Udp),
            Duration::from_millis(1500)
        );

        let start = Instant::now();
        gate.wait_until_ready(RateTier::Short, Channel::Udp).await;
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_udp_waits_for_http_but_http_has_own_clock() {
        let mut gate = gate();
        gate.record_sent(Channel::Http, false);

        assert_eq!(
            gate.required_wait(RateTier::Long, Channel::Udp),
            Duration::from_millis(2500)
        );
        assert_eq!(
            gate.required_wait(RateTier::Long, Channel::Http),
            Duration::from_millis(2500)
        );

        gate.record_sent(Channel::Udp, false);
        tokio::time::advance(Duration::from_millis(2500)).await;
        assert_eq!(gate.required_wait(RateTier::Long, Channel::Http), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_and_non_ping_are_tracked_separately() {
        let mut gate = gate();
        gate.record_sent(Channel::Udp, false);
        tokio::time::advance(Duration::from_secs(30)).await;
        gate.record_sent(Channel::Udp, true);

        assert_eq!(gate.since_last_non_ping(), Some(Duration::from_secs(30)));
        assert_eq!(gate.since_last_ping(), Some(Duration::ZERO));
        assert_eq!(gate.since_last_udp(), Some(Duration::ZERO));
        assert_eq!(gate.since_last_http(), None);
    }
}
