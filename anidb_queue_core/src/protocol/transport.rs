//! Datagram transport
//!
//! The [`Transport`] trait is the seam between the protocol client and the
//! network. [`UdpTransport`] talks to the real server; tests substitute a
//! scripted transport.

use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::error::{ProtocolError, Result};
use async_trait::async_trait;
use log::{debug, trace, warn};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::{UdpSocket, lookup_host};

/// A connected, unreliable datagram channel to the AniDB server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram
    async fn send(&self, datagram: &[u8]) -> Result<()>;

    /// Receive one datagram into `buffer`, returning its length
    async fn recv(&self, buffer: &mut [u8]) -> Result<usize>;
}

/// UDP socket bound to the configured client port and connected to the server
pub struct UdpTransport {
    socket: UdpSocket,
    server_addr: SocketAddr,
}

impl UdpTransport {
    /// Resolve `host:port`, bind `0.0.0.0:client_port` and connect
    pub async fn connect(host: &str, port: u16, client_port: u16) -> Result<Self> {
        let server_addr = lookup_host((host, port))
            .await?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| {
                ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No IPv4 address for {host}"),
                ))
            })?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, client_port)).await?;
        socket.connect(server_addr).await?;
        debug!(
            "UDP transport bound to {} and connected to {server_addr}",
            socket.local_addr()?
        );

        Ok(Self {
            socket,
            server_addr,
        })
    }

    /// Get the local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Get the server address
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        if datagram.len() > MAX_PACKET_SIZE {
            warn!(
                "Packet too large: {} bytes (max: {MAX_PACKET_SIZE})",
                datagram.len()
            );
            return Err(ProtocolError::packet_too_large(datagram.len(), MAX_PACKET_SIZE));
        }

        let sent = self.socket.send(datagram).await?;
        if sent != datagram.len() {
            return Err(ProtocolError::invalid_packet(format!(
                "Partial send: {sent} of {} bytes",
                datagram.len()
            )));
        }
        trace!("Sent {sent} bytes to {}", self.server_addr);
        Ok(())
    }

    async fn recv(&self, buffer: &mut [u8]) -> Result<usize> {
        let size = self.socket.recv(buffer).await?;
        if size == 0 {
            return Err(ProtocolError::invalid_packet("Empty response"));
        }
        trace!("Received {size} bytes from {}", self.server_addr);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_round_trip_against_local_socket() {
        let server = match UdpSocket::bind("127.0.0.1:0").await {
            Ok(socket) => socket,
            Err(e) => {
                eprintln!("Skipping UDP test, cannot bind: {e}");
                return;
            }
        };
        let server_port = server.local_addr().unwrap().port();

        let transport = match UdpTransport::connect("127.0.0.1", server_port, 0).await {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Skipping UDP test, cannot connect: {e}");
                return;
            }
        };

        transport.send(b"PING").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"PING");
        server.send_to(b"300 PONG\n", from).await.unwrap();

        let mut reply = [0u8; 64];
        let len = transport.recv(&mut reply).await.unwrap();
        assert_eq!(&reply[..len], b"300 PONG\n");
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_datagram() {
        let transport = match UdpTransport::connect("127.0.0.1", 9, 0).await {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Skipping UDP test, cannot connect: {e}");
                return;
            }
        };
        let oversized = vec![b'x'; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            transport.send(&oversized).await,
            Err(ProtocolError::PacketTooLarge { .. })
        ));
    }
}
