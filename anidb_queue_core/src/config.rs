//! Core configuration
//!
//! Every section has serde defaults so that partial TOML files and
//! environment overrides layer cleanly on top of [`QueueClientConfig::default`].

use crate::credentials::LoginTarget;
use crate::error::{Result, ValidationError};
use crate::protocol::{DEFAULT_CLIENT_PORT, DEFAULT_PORT, DEFAULT_SERVER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the queue and its AniDB session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueClientConfig {
    pub anidb: AniDbConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub http: HttpConfig,
    pub queue: QueueConfig,
    pub mylist: MyListConfig,
    pub schedule: ScheduleConfig,
}

impl QueueClientConfig {
    /// Configuration with millisecond delays for fast tests
    pub fn test() -> Self {
        Self {
            anidb: AniDbConfig {
                username: Some("testuser".to_string()),
                password: Some("testpass".to_string()),
                client_name: "testclient".to_string(),
                client_version: "1".to_string(),
                ..Default::default()
            },
            rate_limit: RateLimitConfig {
                long_delay_ms: 40,
                short_delay_ms: 20,
            },
            queue: QueueConfig {
                poll_interval_ms: 25,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check values that would otherwise fail late and obscurely
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.short_delay_ms > self.rate_limit.long_delay_ms {
            return Err(ValidationError::invalid_configuration(
                "rate_limit.short_delay_ms must not exceed rate_limit.long_delay_ms",
            )
            .into());
        }
        if self.session.keep_alive_interval_secs == 0 {
            return Err(ValidationError::invalid_configuration(
                "session.keep_alive_interval_secs must be at least 1",
            )
            .into());
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(ValidationError::invalid_configuration(
                "queue.poll_interval_ms must be at least 1",
            )
            .into());
        }
        Ok(())
    }
}

/// AniDB account and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AniDbConfig {
    pub host: String,
    pub port: u16,
    pub client_port: u16,
    pub client_name: String,
    pub client_version: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub http_base_url: String,
    pub image_base_url: String,
}

impl Default for AniDbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            client_name: "anidbqueue".to_string(),
            client_version: "1".to_string(),
            username: None,
            password: None,
            http_base_url: "http://api.anidb.net:9001/httpapi".to_string(),
            image_base_url: "https://cdn.anidb.net/images/main".to_string(),
        }
    }
}

impl AniDbConfig {
    /// Build the login target, failing fast when credentials are absent
    pub fn login_target(&self) -> Result<LoginTarget> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ValidationError::missing_credentials("username"))?;
        let password = self
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ValidationError::missing_credentials("password"))?;

        let target = LoginTarget::new(
            username,
            password,
            self.host.clone(),
            self.port,
            self.client_port,
        );
        target.validate()?;
        Ok(target)
    }
}

/// Minimum spacing between outbound messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub long_delay_ms: u64,
    pub short_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            long_delay_ms: 2500,
            short_delay_ms: 1250,
        }
    }
}

impl RateLimitConfig {
    pub fn long_delay(&self) -> Duration {
        Duration::from_millis(self.long_delay_ms)
    }

    pub fn short_delay(&self) -> Duration {
        Duration::from_millis(self.short_delay_ms)
    }
}

/// Session keep-alive and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub keep_alive_interval_secs: u64,
    pub idle_logout_secs: u64,
    pub ping_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Pause after a successful login before the first command
    pub post_login_delay_ms: u64,
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_secs: 5,
            idle_logout_secs: 600,
            ping_interval_secs: 20,
            request_timeout_secs: 30,
            post_login_delay_ms: 0,
            channel_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn idle_logout(&self) -> Duration {
        Duration::from_secs(self.idle_logout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn post_login_delay(&self) -> Duration {
        Duration::from_millis(self.post_login_delay_ms)
    }
}

/// HTTP API freshness policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// A cached anime younger than this is never re-fetched, forced or not
    pub min_refresh_hours: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            min_refresh_hours: 4,
            request_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn min_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.min_refresh_hours as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Queue processor behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Idle workers re-check their partition this often even without a wake-up
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// What to do with mylist entries whose local file is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MyListDeleteType {
    /// Remove the entry from AniDB
    Delete,
    /// Keep the entry but set its state to deleted
    MarkDeleted,
    /// Keep the entry but set its state to unknown
    MarkUnknown,
    /// Only forget the file locally
    DeleteLocalOnly,
}

/// MyList synchronisation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MyListConfig {
    /// Add hashed files to mylist once identified
    pub add_files: bool,
    /// Storage state written to AniDB: 1 internal, 2 external, 4 remote
    pub storage_state: u8,
    /// Take watched state from AniDB when unwatched locally
    pub read_watched: bool,
    /// Take unwatched state from AniDB when watched locally
    pub read_unwatched: bool,
    /// Push local watched state to AniDB
    pub set_watched: bool,
    /// Push local unwatched state to AniDB
    pub set_unwatched: bool,
    pub delete_type: MyListDeleteType,
}

impl Default for MyListConfig {
    fn default() -> Self {
        Self {
            add_files: true,
            storage_state: 1,
            read_watched: true,
            read_unwatched: false,
            set_watched: true,
            set_unwatched: false,
            delete_type: MyListDeleteType::MarkDeleted,
        }
    }
}

/// Minimum hours between runs of the periodic commands unless forced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub calendar_hours: u64,
    pub updated_hours: u64,
    pub mylist_sync_hours: u64,
    pub mylist_stats_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            calendar_hours: 12,
            updated_hours: 24,
            mylist_sync_hours: 24,
            mylist_stats_hours: 24,
        }
    }
}
