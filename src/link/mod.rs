//! Physical link module
//!
//! The link is a byte pipe with no framing of its own. Reads never block:
//! the transport polls [`Link::read_available`] and enforces its own
//! timeouts against the clock.

mod scripted;
mod serial;

pub use self::scripted::{ScriptedLink, ScriptedPeer};
pub use self::serial::SerialLink;

use crate::core::Result;

/// A point-to-point byte link to the peer controller
pub trait Link: Send {
    /// Opens (or reopens) the link
    fn open(&mut self) -> Result<()>;

    /// Closes the link; closing a closed link is a no-op
    fn close(&mut self);

    /// Whether the link is currently open
    fn is_open(&self) -> bool;

    /// Copies already-buffered bytes into `buf` without waiting.
    /// Returns 0 when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all bytes and flushes them to the wire
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Human readable link description
    fn describe(&self) -> String;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_available(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
