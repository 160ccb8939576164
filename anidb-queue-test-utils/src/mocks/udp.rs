//! Scripted AniDB UDP server
//!
//! [`MockAniDbServer`] stands in for the network behind a
//! [`Connector`](anidb_queue_core::session::Connector). Every datagram the
//! session sends is recorded with the (tokio) time it left, and answered with
//! the next scripted reply for its command name, falling back to a default.
//!
//! ```rust,no_run
//! use anidb_queue_test_utils::MockAniDbServer;
//!
//! let server = MockAniDbServer::new();
//! server.reply("FILE", "320 NO SUCH FILE");
//! server.silence("PING");
//! assert_eq!(server.count("FILE"), 0);
//! ```

use anidb_queue_core::LoginTarget;
use anidb_queue_core::protocol::Transport;
use anidb_queue_core::protocol::error::Result as WireResult;
use anidb_queue_core::session::Connector;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Session key handed out by the default AUTH reply
pub const MOCK_SESSION_KEY: &str = "sesskey";

/// Reply to commands nobody scripted
pub const UNSCRIPTED_REPLY: &str = "598 UNKNOWN COMMAND";

/// One datagram as the server received it
#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub at: Instant,
    pub text: String,
}

impl SentDatagram {
    /// Wire command name, the first word of the request
    pub fn command(&self) -> &str {
        self.text.split_whitespace().next().unwrap_or_default()
    }

    /// Value of `name` in the request parameters
    pub fn param(&self, name: &str) -> Option<&str> {
        let (_, params) = self.text.split_once(' ')?;
        params.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then_some(value)
        })
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    /// Swallow the request so the client times out
    Silence,
}

#[derive(Debug)]
struct ServerState {
    scripted: HashMap<String, VecDeque<Reply>>,
    defaults: HashMap<String, String>,
    sent: Vec<SentDatagram>,
    inbox: VecDeque<String>,
    connections: usize,
}

impl ServerState {
    fn new() -> Self {
        let defaults = [
            ("AUTH", format!("200 {MOCK_SESSION_KEY} LOGIN ACCEPTED")),
            ("LOGOUT", "203 LOGGED OUT".to_string()),
            ("PING", "300 PONG".to_string()),
        ]
        .into_iter()
        .map(|(command, reply)| (command.to_string(), reply))
        .collect();

        Self {
            scripted: HashMap::new(),
            defaults,
            sent: Vec::new(),
            inbox: VecDeque::new(),
            connections: 0,
        }
    }

    fn answer(&mut self, command: &str) -> Reply {
        if let Some(reply) = self
            .scripted
            .get_mut(command)
            .and_then(|queue| queue.pop_front())
        {
            return reply;
        }
        let text = self
            .defaults
            .get(command)
            .cloned()
            .unwrap_or_else(|| UNSCRIPTED_REPLY.to_string());
        Reply::Text(text)
    }
}

/// In-process AniDB server shared by every transport it hands out
#[derive(Clone)]
pub struct MockAniDbServer {
    state: Arc<Mutex<ServerState>>,
    reply_ready: Arc<Notify>,
}

impl MockAniDbServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::new())),
            reply_ready: Arc::new(Notify::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer the next `command` with `text`
    ///
    /// Scripted replies are used in order before the default.
    pub fn reply(&self, command: &str, text: impl Into<String>) -> &Self {
        self.state()
            .scripted
            .entry(command.to_string())
            .or_default()
            .push_back(Reply::Text(text.into()));
        self
    }

    /// Drop the next `command` without answering
    pub fn silence(&self, command: &str) -> &Self {
        self.state()
            .scripted
            .entry(command.to_string())
            .or_default()
            .push_back(Reply::Silence);
        self
    }

    /// Answer every unscripted `command` with `text`
    pub fn respond_always(&self, command: &str, text: impl Into<String>) -> &Self {
        self.state()
            .defaults
            .insert(command.to_string(), text.into());
        self
    }

    /// Every datagram received so far
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.state().sent.clone()
    }

    /// Command names in the order they arrived
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .map(|d| d.command().to_string())
            .collect()
    }

    /// Datagrams for `command` received so far
    pub fn sent_for(&self, command: &str) -> Vec<SentDatagram> {
        self.state()
            .sent
            .iter()
            .filter(|d| d.command() == command)
            .cloned()
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.state()
            .sent
            .iter()
            .filter(|d| d.command() == command)
            .count()
    }

    /// How many transports were opened
    pub fn connections(&self) -> usize {
        self.state().connections
    }

    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    fn receive(&self, datagram: &[u8]) {
        let text = String::from_utf8_lossy(datagram).into_owned();
        let sent = SentDatagram {
            at: Instant::now(),
            text,
        };

        let mut state = self.state();
        let reply = state.answer(sent.command());
        state.sent.push(sent);
        if let Reply::Text(text) = reply {
            state.inbox.push_back(format!("{text}\n"));
            drop(state);
            self.reply_ready.notify_one();
        }
    }

    fn take_reply(&self) -> Option<String> {
        self.state().inbox.pop_front()
    }
}

impl Default for MockAniDbServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockAniDbServer {
    async fn connect(&self, _target: &LoginTarget) -> anidb_queue_core::Result<Box<dyn Transport>> {
        self.state().connections += 1;
        Ok(Box::new(MockTransport {
            server: self.clone(),
        }))
    }
}

/// Transport end of a [`MockAniDbServer`]
pub struct MockTransport {
    server: MockAniDbServer,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, datagram: &[u8]) -> WireResult<()> {
        self.server.receive(datagram);
        Ok(())
    }

    async fn recv(&self, buffer: &mut [u8]) -> WireResult<usize> {
        loop {
            if let Some(reply) = self.server.take_reply() {
                let bytes = reply.as_bytes();
                let len = bytes.len().min(buffer.len());
                buffer[..len].copy_from_slice(&bytes[..len]);
                return Ok(len);
            }
            self.server.reply_ready.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_accessors() {
        let sent = SentDatagram {
            at: Instant::now(),
            text: "FILE size=10&ed2k=abc&s=sesskey".to_string(),
        };
        assert_eq!(sent.command(), "FILE");
        assert_eq!(sent.param("ed2k"), Some("abc"));
        assert_eq!(sent.param("s"), Some(MOCK_SESSION_KEY));
        assert_eq!(sent.param("missing"), None);
    }

    #[tokio::test]
    async fn test_scripted_then_default_replies() {
        let server = MockAniDbServer::new();
        server.reply("PING", "505 ILLEGAL INPUT");
        let target = LoginTarget::new("user", "pass", "localhost", 9000, 4556);
        let transport = server.connect(&target).await.unwrap();

        let mut buffer = [0u8; 64];
        transport.send(b"PING").await.unwrap();
        let len = transport.recv(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..len], b"505 ILLEGAL INPUT\n");

        transport.send(b"PING").await.unwrap();
        let len = transport.recv(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..len], b"300 PONG\n");

        assert_eq!(server.count("PING"), 2);
        assert_eq!(server.connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let server = MockAniDbServer::new();
        server.silence("PING");
        let target = LoginTarget::new("user", "pass", "localhost", 9000, 4556);
        let transport = server.connect(&target).await.unwrap();

        transport.send(b"PING").await.unwrap();
        let mut buffer = [0u8; 64];
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            transport.recv(&mut buffer),
        )
        .await;
        assert!(result.is_err());
    }
}
