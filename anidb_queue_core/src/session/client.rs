//! Session actor and its handle
//!
//! A single task owns the UDP client, the HTTP API, the rate gate and the
//! [`SessionState`]. Every request arrives over one channel and is handled to
//! completion before the next, which is what serializes traffic to AniDB.
//! The keep-alive ticker feeds the same channel, so pings and idle logouts
//! queue behind in-flight commands instead of racing them.

use crate::config::{QueueClientConfig, SessionConfig};
use crate::credentials::LoginTarget;
use crate::error::{BanSource, Error, InternalError, ProtocolError, Result, ValidationError};
use crate::http::{AniDbHttpApi, HttpCredentials, HttpRequest, is_ban_page};
use crate::protocol::error::ProtocolError as WireError;
use crate::protocol::messages::{AuthCommand, LogoutCommand, PingCommand};
use crate::protocol::{Command, ProtocolClient, Response, ResponseCode, Transport, UdpTransport};
use crate::session::rate_gate::{Channel, RateGate, RateTier};
use crate::session::state::{SessionState, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{MissedTickBehavior, interval};

/// Opens the datagram transport used for a login target
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &LoginTarget) -> Result<Box<dyn Transport>>;
}

/// Connects a real UDP socket
pub struct UdpConnector;

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(&self, target: &LoginTarget) -> Result<Box<dyn Transport>> {
        let transport = UdpTransport::connect(&target.host, target.port, target.client_port).await?;
        Ok(Box::new(transport))
    }
}

/// Result of a successfully exchanged command
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// The server returned the requested data
    Data(Response),
    /// A well-formed negative answer, such as 320 NO SUCH FILE
    NoData(Response),
}

impl ExecuteOutcome {
    pub fn response(&self) -> &Response {
        match self {
            Self::Data(r) | Self::NoData(r) => r,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Self::Data(r) | Self::NoData(r) => r,
        }
    }

    pub fn has_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}

/// What a keep-alive tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    Idle,
    Pinged,
    LoggedOut,
}

/// Result of an anime fetch under the freshness policy
#[derive(Debug, Clone, PartialEq)]
pub enum HttpFetch {
    Fetched(String),
    /// The cached copy was kept; nothing was sent
    Cached,
}

/// Whether a cached document should be kept instead of fetched again
///
/// Without `force`, any cached copy wins. A forced refresh still keeps a copy
/// younger than `min_refresh`.
pub fn keep_cached(
    cached_at: Option<DateTime<Utc>>,
    force: bool,
    min_refresh: chrono::Duration,
    now: DateTime<Utc>,
) -> bool {
    match cached_at {
        None => false,
        Some(_) if !force => true,
        Some(at) => now - at < min_refresh,
    }
}

/// How AniDB answered an AUTH
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted { session: String, new_version: bool },
    /// 500 LOGIN FAILED, 503 outdated client, 504 client banned and the like
    Refused { code: ResponseCode },
    Banned { reason: String },
}

impl LoginOutcome {
    pub fn classify(response: Response) -> Self {
        let code = ResponseCode(response.code());
        if let Some(WireError::Banned { reason }) = response.to_error() {
            return Self::Banned { reason };
        }
        match response {
            Response::Auth(auth) if auth.is_accepted() => match auth.session {
                Some(session) => Self::Accepted {
                    session,
                    new_version: auth.code == 201,
                },
                None => Self::Refused { code },
            },
            _ => Self::Refused { code },
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum SessionRequest {
    Login {
        target: Option<LoginTarget>,
        reply: Reply<bool>,
    },
    Logout {
        reply: Reply<()>,
    },
    Execute {
        command: Command,
        tier: RateTier,
        reply: Reply<ExecuteOutcome>,
    },
    FetchHttp {
        request: HttpRequest,
        reply: Reply<String>,
    },
    KeepAliveTick {
        reply: Option<Reply<KeepAliveAction>>,
    },
    SetNetworkAvailable {
        available: bool,
    },
    ClearBan {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Builder for [`SessionClient`]
pub struct SessionClientBuilder {
    config: QueueClientConfig,
    connector: Arc<dyn Connector>,
    http: Option<Arc<dyn AniDbHttpApi>>,
    keep_alive: bool,
}

impl SessionClientBuilder {
    pub fn new(config: QueueClientConfig) -> Self {
        Self {
            config,
            connector: Arc::new(UdpConnector),
            http: None,
            keep_alive: true,
        }
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn http_api(mut self, http: Arc<dyn AniDbHttpApi>) -> Self {
        self.http = Some(http);
        self
    }

    /// Disable the background keep-alive ticker; ticks can still be sent by hand
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Start the actor on the current runtime
    pub fn spawn(self) -> Result<SessionClient> {
        let http = match self.http {
            Some(http) => http,
            None => Arc::new(crate::http::ReqwestHttpApi::new(&self.config)?),
        };
        let (tx, rx) = mpsc::channel(self.config.session.channel_capacity.max(1));
        let state = SessionState::new(RateGate::from_config(&self.config.rate_limit));
        let (status_tx, status_rx) = watch::channel(state.snapshot());

        let actor = SessionActor {
            session: self.config.session.clone(),
            client_name: self.config.anidb.client_name.clone(),
            client_version: self.config.anidb.client_version.clone(),
            connector: self.connector,
            http,
            client: None,
            connected_to: None,
            target: None,
            state,
            status_tx,
        };
        tokio::spawn(actor.run(rx));

        if self.keep_alive {
            spawn_ticker(&tx, self.config.session.keep_alive_interval());
        }

        Ok(SessionClient {
            tx,
            status: status_rx,
            min_refresh: self.config.http.min_refresh_interval(),
        })
    }
}

fn spawn_ticker(tx: &mpsc::Sender<SessionRequest>, period: std::time::Duration) {
    let weak = tx.downgrade();
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(tx) = weak.upgrade() else {
                break;
            };
            if tx
                .send(SessionRequest::KeepAliveTick { reply: None })
                .await
                .is_err()
            {
                break;
            }
        }
        debug!("Keep-alive ticker stopped");
    });
}

/// Cloneable handle to the session actor
#[derive(Clone)]
pub struct SessionClient {
    tx: mpsc::Sender<SessionRequest>,
    status: watch::Receiver<SessionStatus>,
    min_refresh: chrono::Duration,
}

impl SessionClient {
    pub fn builder(config: QueueClientConfig) -> SessionClientBuilder {
        SessionClientBuilder::new(config)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionRequest) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| InternalError::channel_closed("session"))?;
        rx.await
            .map_err(|_| InternalError::channel_closed("session"))?
    }

    /// Open a session
    ///
    /// `target` replaces the remembered credentials; `None` reuses them.
    /// Returns `Ok(false)` when AniDB refused the login without banning us.
    pub async fn login(&self, target: Option<LoginTarget>) -> Result<bool> {
        self.request(|reply| SessionRequest::Login { target, reply })
            .await
    }

    /// Close the session; a no-op when not logged in
    pub async fn logout(&self) -> Result<()> {
        self.request(|reply| SessionRequest::Logout { reply }).await
    }

    /// Send `command` once the gate allows, logging in first when needed
    pub async fn execute(&self, command: Command, tier: RateTier) -> Result<ExecuteOutcome> {
        self.request(|reply| SessionRequest::Execute {
            command,
            tier,
            reply,
        })
        .await
    }

    /// Send an HTTP API request through the same gate
    pub async fn fetch_http(&self, request: HttpRequest) -> Result<String> {
        self.request(|reply| SessionRequest::FetchHttp { request, reply })
            .await
    }

    /// Fetch an anime document unless the cached copy is fresh enough
    pub async fn fetch_anime(
        &self,
        aid: u64,
        force: bool,
        cached_at: Option<DateTime<Utc>>,
    ) -> Result<HttpFetch> {
        if keep_cached(cached_at, force, self.min_refresh, Utc::now()) {
            debug!("Anime {aid}: cached copy kept (force={force})");
            return Ok(HttpFetch::Cached);
        }
        let body = self.fetch_http(HttpRequest::Anime { aid }).await?;
        Ok(HttpFetch::Fetched(body))
    }

    /// Run one keep-alive check now
    pub async fn keep_alive_tick(&self) -> Result<KeepAliveAction> {
        self.request(|reply| SessionRequest::KeepAliveTick { reply: Some(reply) })
            .await
    }

    pub async fn set_network_available(&self, available: bool) -> Result<()> {
        self.tx
            .send(SessionRequest::SetNetworkAvailable { available })
            .await
            .map_err(|_| InternalError::channel_closed("session").into())
    }

    /// Lift UDP and HTTP bans
    pub async fn clear_ban(&self) -> Result<()> {
        self.request(|reply| SessionRequest::ClearBan { reply })
            .await
    }

    /// Log out and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| SessionRequest::Shutdown { reply })
            .await
    }

    /// Latest published status
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

struct SessionActor {
    session: SessionConfig,
    client_name: String,
    client_version: String,
    connector: Arc<dyn Connector>,
    http: Arc<dyn AniDbHttpApi>,
    client: Option<ProtocolClient>,
    connected_to: Option<(String, u16, u16)>,
    target: Option<LoginTarget>,
    state: SessionState,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionRequest>) {
        debug!("Session actor started");
        while let Some(request) = rx.recv().await {
            match request {
                SessionRequest::Login { target, reply } => {
                    let result = self.login(target).await;
                    let _ = reply.send(result);
                }
                SessionRequest::Logout { reply } => {
                    self.logout().await;
                    let _ = reply.send(Ok(()));
                }
                SessionRequest::Execute {
                    command,
                    tier,
                    reply,
                } => {
                    let result = self.execute(command, tier).await;
                    let _ = reply.send(result);
                }
                SessionRequest::FetchHttp { request, reply } => {
                    let result = self.fetch_http(request).await;
                    let _ = reply.send(result);
                }
                SessionRequest::KeepAliveTick { reply } => {
                    let action = self.keep_alive().await;
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(action));
                    }
                }
                SessionRequest::SetNetworkAvailable { available } => {
                    if self.state.network_available != available {
                        info!("Network availability changed: {available}");
                    }
                    self.state.network_available = available;
                }
                SessionRequest::ClearBan { reply } => {
                    info!("Clearing AniDB ban state");
                    self.state.clear_bans();
                    self.state.network_available = true;
                    let _ = reply.send(Ok(()));
                }
                SessionRequest::Shutdown { reply } => {
                    self.logout().await;
                    self.publish();
                    let _ = reply.send(Ok(()));
                    break;
                }
            }
            self.publish();
        }
        debug!("Session actor stopped");
    }

    fn publish(&self) {
        self.status_tx.send_if_modified(|status| {
            let next = self.state.snapshot();
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
    }

    fn ban(&mut self, source: BanSource, reason: &str) -> Error {
        error!("AniDB {source} ban detected: {reason}");
        self.state.mark_banned(source, Utc::now());
        // The session key stays valid; only idle, explicit or 506 logouts end it
        self.state.last_error = Some(format!("banned: {reason}"));
        ProtocolError::banned(source, reason).into()
    }

    async fn ensure_client(&mut self, target: &LoginTarget) -> Result<()> {
        let endpoint = (target.host.clone(), target.port, target.client_port);
        if self.client.is_some() && self.connected_to.as_ref() == Some(&endpoint) {
            return Ok(());
        }
        info!(
            "Connecting to AniDB at {}:{} from local port {}",
            target.host, target.port, target.client_port
        );
        let transport = self.connector.connect(target).await?;
        self.client = Some(ProtocolClient::new(
            transport,
            self.session.request_timeout(),
        ));
        self.connected_to = Some(endpoint);
        Ok(())
    }

    /// Gate, record and exchange one UDP command
    async fn send(&mut self, command: &Command, tier: RateTier) -> Result<Response> {
        self.state.gate.wait_until_ready(tier, Channel::Udp).await;
        let session = self.state.session_key().map(str::to_owned);
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| ProtocolError::network("no UDP connection"))?;

        self.state.gate.record_sent(Channel::Udp, command.is_ping());
        match client.exchange(command, session.as_deref()).await {
            Ok(response) => Ok(response),
            Err(err @ (WireError::Io(_) | WireError::Timeout(_))) => {
                self.state.last_error = Some(err.to_string());
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn login(&mut self, target: Option<LoginTarget>) -> Result<bool> {
        if let Some(target) = target {
            target.validate()?;
            self.target = Some(target);
        }
        let target = self
            .target
            .clone()
            .ok_or_else(|| ValidationError::missing_credentials("username"))?;

        if self.state.is_banned(BanSource::Udp) {
            return Err(ProtocolError::banned(BanSource::Udp, "ban still active").into());
        }
        if self.state.is_logged_in() {
            return Ok(true);
        }

        self.ensure_client(&target).await?;
        let auth = Command::Auth(AuthCommand::new(
            target.username.clone(),
            target.password.clone(),
            self.client_name.clone(),
            self.client_version.clone(),
        ));
        info!("Logging in to AniDB as {}", target.username);
        let response = self.send(&auth, RateTier::Long).await?;

        match LoginOutcome::classify(response) {
            LoginOutcome::Accepted { session, new_version } => {
                if new_version {
                    warn!("AniDB reports a newer client version is available");
                }
                self.state.begin(session);
                self.publish();
                info!("Logged in to AniDB");
                let delay = self.session.post_login_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(true)
            }
            LoginOutcome::Banned { reason } => Err(self.ban(BanSource::Udp, &reason)),
            LoginOutcome::Refused { code } if (600..=604).contains(&code.0) => {
                let err = ProtocolError::server_error(code.0, code.description());
                self.state.last_error = Some(err.to_string());
                Err(err.into())
            }
            LoginOutcome::Refused { code } => {
                warn!("AniDB login refused: {code}");
                self.state.last_error = Some(format!("login refused: {code}"));
                Ok(false)
            }
        }
    }

    async fn logout(&mut self) {
        if !self.state.is_logged_in() {
            return;
        }
        let command = Command::Logout(LogoutCommand);
        match self.send(&command, RateTier::Long).await {
            Ok(response) => debug!("Logout answered {}", response.code()),
            Err(err) => warn!("Logout failed, dropping session anyway: {err}"),
        }
        self.state.end();
        info!("Logged out of AniDB");
    }

    async fn ensure_logged_in(&mut self) -> Result<()> {
        if self.state.is_logged_in() {
            return Ok(());
        }
        if self.login(None).await? {
            Ok(())
        } else {
            let message = self
                .state
                .last_error
                .clone()
                .unwrap_or_else(|| "login refused".to_string());
            Err(ProtocolError::LoginRefused { code: 500, message }.into())
        }
    }

    async fn execute(&mut self, command: Command, tier: RateTier) -> Result<ExecuteOutcome> {
        if self.state.is_banned(BanSource::Udp) {
            return Err(ProtocolError::banned(BanSource::Udp, "ban still active").into());
        }
        if command.requires_auth() {
            self.ensure_logged_in().await?;
        } else if let Some(target) = self.target.clone() {
            self.ensure_client(&target).await?;
        }

        let response = self.send(&command, tier).await?;
        match response.to_error() {
            Some(WireError::InvalidSession) => {
                warn!("{} rejected: session invalid", command.name());
                self.state.invalidate();
                Err(ProtocolError::InvalidSession.into())
            }
            Some(WireError::Banned { reason }) => Err(self.ban(BanSource::Udp, &reason)),
            Some(err) => Err(err.into()),
            None if ResponseCode(response.code()).is_no_data() => {
                Ok(ExecuteOutcome::NoData(response))
            }
            None => Ok(ExecuteOutcome::Data(response)),
        }
    }

    async fn fetch_http(&mut self, request: HttpRequest) -> Result<String> {
        if self.state.is_banned(BanSource::Http) {
            return Err(ProtocolError::banned(BanSource::Http, "ban still active").into());
        }
        let credentials = if request.needs_credentials() {
            let target = self
                .target
                .as_ref()
                .ok_or_else(|| ValidationError::missing_credentials("username"))?;
            Some(HttpCredentials {
                username: target.username.clone(),
                password: target.password.clone(),
            })
        } else {
            None
        };

        self.state
            .gate
            .wait_until_ready(RateTier::Long, Channel::Http)
            .await;
        self.state.gate.record_sent(Channel::Http, false);
        let body = self.http.fetch(&request, credentials.as_ref()).await?;

        if is_ban_page(&body) {
            return Err(self.ban(BanSource::Http, "HTTP API returned a ban page"));
        }
        Ok(body)
    }

    async fn keep_alive(&mut self) -> KeepAliveAction {
        if !self.state.is_logged_in() {
            return KeepAliveAction::Idle;
        }

        let idle = self.state.gate.since_last_non_ping();
        if idle.is_some_and(|idle| idle >= self.session.idle_logout()) {
            info!("No AniDB activity for {:?}, logging out", self.session.idle_logout());
            self.logout().await;
            return KeepAliveAction::LoggedOut;
        }

        let interval = self.session.ping_interval();
        let udp_quiet = self
            .state
            .gate
            .since_last_udp()
            .is_none_or(|since| since >= interval);
        let ping_due = self
            .state
            .gate
            .since_last_ping()
            .is_none_or(|since| since >= interval);
        if !udp_quiet || !ping_due || self.state.is_banned(BanSource::Udp) {
            return KeepAliveAction::Idle;
        }

        let ping = Command::Ping(PingCommand::default());
        match self.send(&ping, RateTier::Short).await {
            Ok(response) => {
                if let Some(WireError::Banned { reason }) = response.to_error() {
                    let _ = self.ban(BanSource::Udp, &reason);
                }
            }
            Err(err) => warn!("Keep-alive ping failed: {err}"),
        }
        KeepAliveAction::Pinged
    }
}
