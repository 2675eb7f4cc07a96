use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom error types for the field link
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Link unhealthy: {0}")]
    LinkUnhealthy(String),

    #[error("Partial push to {slot} slot: {delivered}/{total} frames delivered")]
    PartialPush {
        /// Slot the push targeted
        slot: String,
        /// Frames that got a reply
        delivered: usize,
        /// Frames attempted
        total: usize,
    },

    #[error("Push to {slot} slot failed: no frame delivered")]
    PushFailed {
        /// Slot the push targeted
        slot: String,
    },

    #[error("Link error: {0}")]
    Link(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new invalid command error
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Error::InvalidCommand(msg.into())
    }

    /// Creates a new invalid address error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Error::InvalidAddress(msg.into())
    }

    /// Creates a new malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedResponse(msg.into())
    }

    /// Creates a new link unhealthy error
    pub fn unhealthy(msg: impl Into<String>) -> Self {
        Error::LinkUnhealthy(msg.into())
    }

    /// Creates a new link error
    pub fn link(msg: impl Into<String>) -> Self {
        Error::Link(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether the error comes from the link itself rather than from the
    /// content of a frame. These are absorbed by the reset policy.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::LinkUnhealthy(_) | Error::Link(_) | Error::Io(_)
        )
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Error::Link(err.to_string())
    }
}
