//! Field link: resilient request/response protocol over a point-to-point
//! serial link to a field-device controller
//!
//! The crate frames commands and replies, keeps transmission statistics,
//! watches link health and resets the link when it degrades, pushes time
//! server settings into the peer and keeps a time synchronization with it.
//! Everything runs cooperatively from one control loop.
pub mod controller;
pub mod core;
pub mod link;
pub mod protocol;
pub mod sync;
pub mod time;
pub mod transport;

// Re-export commonly used items
pub use crate::controller::{Controller, PollReport};
pub use crate::core::{Command, Config, Error, ResponseFrame, Result};
pub use crate::protocol::ServerSlot;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
