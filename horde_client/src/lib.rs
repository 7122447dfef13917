//! `horde_client`
//!
//! Headless client:
//! - Handshake and join over the reliable stream
//! - Local mirror of players and enemies built from server events
//! - Wander input for bots and soak tests

pub mod client;
pub mod input;
pub mod mirror;

pub use client::GameClient;
