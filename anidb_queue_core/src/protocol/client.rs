//! Single request/response exchange with the AniDB UDP API
//!
//! The client has no notion of rate limits or sessions. The session actor is
//! its only owner and is responsible for both.

use crate::protocol::codec::Codec;
use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::messages::{Command, Response, ResponseParser};
use crate::protocol::transport::{Transport, UdpTransport};
use crate::protocol::{DEFAULT_CLIENT_PORT, DEFAULT_PORT, DEFAULT_SERVER, MAX_PACKET_SIZE};
use log::{debug, trace, warn};
use std::time::Duration;
use tokio::time::timeout;

/// Protocol client configuration
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Server host name
    pub host: String,
    /// Server UDP port
    pub port: u16,
    /// Local UDP port
    pub client_port: u16,
    /// How long to wait for a reply
    pub request_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Sends one command and waits for its reply
pub struct ProtocolClient {
    transport: Box<dyn Transport>,
    codec: Codec,
    request_timeout: Duration,
}

impl ProtocolClient {
    /// Create a client over an existing transport
    pub fn new(transport: Box<dyn Transport>, request_timeout: Duration) -> Self {
        Self {
            transport,
            codec: Codec::new(),
            request_timeout,
        }
    }

    /// Open a UDP transport for `config` and wrap it
    pub async fn connect(config: &ProtocolConfig) -> Result<Self> {
        let transport = UdpTransport::connect(&config.host, config.port, config.client_port).await?;
        Ok(Self::new(Box::new(transport), config.request_timeout))
    }

    /// Send `command`, tagged with `session` when it needs one, and parse the reply
    pub async fn exchange(&mut self, command: &Command, session: Option<&str>) -> Result<Response> {
        let request = command.encode(session);
        debug!("Sending {}", command.redacted());

        let datagram = self.codec.encode(&request)?;
        self.transport.send(&datagram).await?;

        let mut buffer = vec![0u8; MAX_PACKET_SIZE * 4];
        let size = timeout(self.request_timeout, self.transport.recv(&mut buffer))
            .await
            .map_err(|_| {
                warn!(
                    "No reply to {} within {:?}",
                    command.name(),
                    self.request_timeout
                );
                ProtocolError::Timeout(self.request_timeout)
            })??;

        let text = self.codec.decode(&buffer[..size])?;
        trace!("Reply to {}: {text}", command.name());

        let response = ResponseParser::parse(&text, command.name())?;
        debug!("{} -> {} {}", command.name(), response.code(), response.message());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{FileCommand, PingCommand};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct EchoTransport {
        sent: Arc<Mutex<Vec<String>>>,
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, datagram: &[u8]) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(datagram).into_owned());
            Ok(())
        }

        async fn recv(&self, buffer: &mut [u8]) -> Result<usize> {
            match self.reply {
                Some(reply) => {
                    buffer[..reply.len()].copy_from_slice(reply.as_bytes());
                    Ok(reply.len())
                }
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_exchange_appends_session_and_parses() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = EchoTransport {
            sent: sent.clone(),
            reply: Some("320 NO SUCH FILE\n"),
        };
        let mut client = ProtocolClient::new(Box::new(transport), Duration::from_secs(1));

        let response = client
            .exchange(&Command::File(FileCommand::by_id(7)), Some("sess"))
            .await
            .unwrap();

        assert_eq!(response.code(), 320);
        let sent = sent.lock().unwrap();
        assert!(sent[0].starts_with("FILE fid=7&"));
        assert!(sent[0].ends_with("&s=sess"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_times_out() {
        let transport = EchoTransport {
            sent: Arc::new(Mutex::new(Vec::new())),
            reply: None,
        };
        let mut client = ProtocolClient::new(Box::new(transport), Duration::from_secs(30));

        let result = client
            .exchange(&Command::Ping(PingCommand::default()), None)
            .await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
    }
}
