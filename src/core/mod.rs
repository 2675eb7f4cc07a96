//! Core types and traits for the field link
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod events;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::events::{Event, EventSink, MemorySink, Severity, TracingSink};
pub use self::types::{
    Command,
    Config,
    HealthConfig,
    LinkConfig,
    PushConfig,
    ResponseFrame,
    SyncConfig,
    TransportConfig,
};

/// Maximum command length in bytes
pub const MAX_COMMAND_LEN: usize = 100;

/// Maximum inbound frame length in bytes
pub const MAX_FRAME_LEN: usize = 255;

/// Default link baud rate
pub const DEFAULT_BAUD_RATE: u32 = 250_000;
