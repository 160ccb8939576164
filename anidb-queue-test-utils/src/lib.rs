//! Test utilities for the AniDB command queue
//!
//! Scripted stand-ins for the UDP server, the HTTP API, the file hasher and
//! the image store, plus a builder that wires them into a
//! [`CommandContext`](anidb_queue_core::CommandContext).

pub mod builders;
pub mod mocks;

pub use builders::{TestContext, TestContextBuilder, sample_hashes};
pub use mocks::{
    MOCK_SESSION_KEY, MockAniDbServer, MockFileHasher, MockHttpApi, MockImageDownloader,
    SentDatagram, anime_xml,
};
