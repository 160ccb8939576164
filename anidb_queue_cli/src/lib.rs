//! Support code for the `anidb-queue` binary

pub mod config;
pub mod error;
pub mod paths;
pub mod status;
pub mod terminal;
