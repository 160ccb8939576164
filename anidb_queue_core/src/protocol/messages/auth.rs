//! Session messages: AUTH, LOGOUT and PING

use crate::credentials::SecureString;
use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::messages::{AniDBCommand, AniDBResponse, RawResponse};

/// AUTH command opening a session
#[derive(Clone)]
pub struct AuthCommand {
    pub user: String,
    pub pass: SecureString,
    pub client: String,
    pub clientver: String,
    pub nat: bool,
}

impl std::fmt::Debug for AuthCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCommand")
            .field("user", &self.user)
            .field("pass", &"***")
            .field("client", &self.client)
            .field("clientver", &self.clientver)
            .field("nat", &self.nat)
            .finish()
    }
}

impl AuthCommand {
    pub fn new(
        user: impl Into<String>,
        pass: SecureString,
        client: impl Into<String>,
        clientver: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            pass,
            client: client.into(),
            clientver: clientver.into(),
            nat: true,
        }
    }
}

impl AniDBCommand for AuthCommand {
    fn name(&self) -> &'static str {
        "AUTH"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("user", self.user.clone()),
            ("pass", self.pass.expose_secret().to_string()),
            ("protover", crate::protocol::PROTOCOL_VERSION.to_string()),
            ("client", self.client.clone()),
            ("clientver", self.clientver.clone()),
        ];
        if self.nat {
            params.push(("nat", "1".to_string()));
        }
        params.push(("enc", "UTF8".to_string()));
        params
    }

    fn requires_auth(&self) -> bool {
        false
    }
}

/// Response to AUTH
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub code: u16,
    pub message: String,
    /// Session key, present on 200/201
    pub session: Option<String>,
    /// Our address as seen by the server when NAT detection was requested
    pub external_addr: Option<String>,
}

impl AuthResponse {
    /// Parse an AUTH reply
    ///
    /// On success the header reads `200 {session} [{ip}:{port}] LOGIN ACCEPTED`.
    pub fn parse(raw: &RawResponse) -> Result<Self> {
        let mut response = Self {
            code: raw.code,
            message: raw.message.clone(),
            session: None,
            external_addr: None,
        };

        if matches!(raw.code, 200 | 201) {
            let mut words = raw.message.split_whitespace();
            let session = words
                .next()
                .filter(|w| *w != "LOGIN")
                .ok_or_else(|| ProtocolError::malformed("AUTH reply without session key"))?;
            response.session = Some(session.to_string());

            let rest: Vec<&str> = words.collect();
            match rest.first() {
                Some(addr) if addr.contains(':') => {
                    response.external_addr = Some(addr.to_string());
                    response.message = rest[1..].join(" ");
                }
                _ => response.message = rest.join(" "),
            }
        }

        Ok(response)
    }

    pub fn is_accepted(&self) -> bool {
        self.session.is_some()
    }
}

impl AniDBResponse for AuthResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// LOGOUT command
#[derive(Debug, Clone, Default)]
pub struct LogoutCommand;

impl AniDBCommand for LogoutCommand {
    fn name(&self) -> &'static str {
        "LOGOUT"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Response to LOGOUT; 203 LOGGED OUT or 403 NOT LOGGED IN
#[derive(Debug, Clone)]
pub struct LogoutResponse {
    pub code: u16,
    pub message: String,
}

impl AniDBResponse for LogoutResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}

/// PING keep-alive, with NAT port reporting
#[derive(Debug, Clone)]
pub struct PingCommand {
    pub nat: bool,
}

impl Default for PingCommand {
    fn default() -> Self {
        Self { nat: true }
    }
}

impl AniDBCommand for PingCommand {
    fn name(&self) -> &'static str {
        "PING"
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        if self.nat {
            vec![("nat", "1".to_string())]
        } else {
            Vec::new()
        }
    }
}

/// 300 PONG, optionally carrying the NAT-mapped port
#[derive(Debug, Clone)]
pub struct PongResponse {
    pub code: u16,
    pub message: String,
    pub port: Option<u16>,
}

impl PongResponse {
    pub fn parse(raw: &RawResponse) -> Self {
        Self {
            code: raw.code,
            message: raw.message.clone(),
            port: raw.fields().first().and_then(|p| p.parse().ok()),
        }
    }
}

impl AniDBResponse for PongResponse {
    fn code(&self) -> u16 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }
}
