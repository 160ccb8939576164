//! AniDB UDP protocol
//!
//! - `transport`: datagram I/O behind a trait so tests can script the server
//! - `codec`: datagram encoding and decoding
//! - `messages`: typed requests and parsed responses
//! - `client`: a single request/response exchange with a receive timeout
//!
//! Rate limiting and session handling live in [`crate::session`], which is the
//! only owner of a [`ProtocolClient`].

pub mod client;
pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

pub use client::{ProtocolClient, ProtocolConfig};
pub use error::{ProtocolError, ResponseCode, Result};
pub use messages::{Command, Response};
pub use transport::{Transport, UdpTransport};

/// Protocol version supported by this implementation
pub const PROTOCOL_VERSION: &str = "3";

/// Maximum UDP packet size (considering PPPoE)
pub const MAX_PACKET_SIZE: usize = 1400;

/// Default AniDB server address
pub const DEFAULT_SERVER: &str = "api.anidb.net";

/// Default AniDB UDP port
pub const DEFAULT_PORT: u16 = 9000;

/// Default local UDP port
pub const DEFAULT_CLIENT_PORT: u16 = 4556;
