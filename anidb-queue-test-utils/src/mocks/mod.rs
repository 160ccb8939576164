//! Mock collaborators for the session and the command catalog

pub mod collaborators;
pub mod http;
pub mod udp;

pub use collaborators::{MockFileHasher, MockImageDownloader};
pub use http::{HttpCall, MockHttpApi, anime_xml};
pub use udp::{MOCK_SESSION_KEY, MockAniDbServer, MockTransport, SentDatagram};
