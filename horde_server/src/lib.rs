//! `horde_server`
//!
//! Authoritative world-state server:
//! - Connection registry and world state store
//! - Enemy simulation and spawner on fixed timers
//! - Event router for inbound messages
//! - Hub fan-out to one, some, or all connections
//!
//! Networking model:
//! - TCP only, one length-prefixed JSON frame per message
//! - Player state is event-driven; enemies also get a periodic snapshot

pub mod clock;
pub mod enemy;
pub mod hub;
pub mod player;
pub mod policy;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod sim;
pub mod spawner;
pub mod store;

pub use server::GameServer;
