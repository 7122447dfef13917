//! `horde_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One closed wire vocabulary for both directions.
//! - Clear separation of concerns (net, math, config, character directory).
//! - Traits at the persistence seam for dependency injection.
//! - No `unsafe`.

pub mod character;
pub mod config;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
