//! AniDB session management
//!
//! - `rate_gate`: spacing between outbound messages
//! - `state`: the session record and its published snapshot
//! - `client`: the actor that owns both, and its cloneable handle

pub mod client;
pub mod rate_gate;
pub mod state;

pub use client::{
    Connector, ExecuteOutcome, HttpFetch, KeepAliveAction, LoginOutcome, SessionClient,
    SessionClientBuilder, UdpConnector, keep_cached,
};
pub use rate_gate::{Channel, RateGate, RateTier};
pub use state::{SessionState, SessionStatus};
