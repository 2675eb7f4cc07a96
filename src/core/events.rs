//! Structured event sink
//!
//! Every state transition of the link (reset, health change, sync success or
//! loss, configuration push outcome) is reported as one event carrying a
//! message, a severity and a short source tag. The sink is fire-and-forget:
//! reporting never fails and never blocks the caller on a consumer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Source tag for link events
pub const SOURCE_LINK: &str = "UART";
/// Source tag for configuration push events
pub const SOURCE_PUSH: &str = "NTP";
/// Source tag for time synchronization events
pub const SOURCE_TIME: &str = "TIME";

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warn,
    Info,
    Debug,
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Success => "SUCCESS",
        };
        f.write_str(name)
    }
}

/// One reported event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub message: String,
    pub severity: Severity,
    pub source: String,
}

/// Consumer of link events
pub trait EventSink: Send + Sync {
    /// Records one event
    fn add_log(&self, message: &str, severity: Severity, source: &str);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn add_log(&self, message: &str, severity: Severity, source: &str) {
        match severity {
            Severity::Error => tracing::error!(source, "{}", message),
            Severity::Warn => tracing::warn!(source, "{}", message),
            Severity::Info => tracing::info!(source, "{}", message),
            Severity::Debug => tracing::debug!(source, "{}", message),
            Severity::Success => tracing::info!(source, success = true, "{}", message),
        }
    }
}

/// Bounded in-memory ring of events, oldest evicted first
#[derive(Debug, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<Event>>>,
    capacity: usize,
}

impl MemorySink {
    /// Default ring capacity
    pub const DEFAULT_CAPACITY: usize = 50;

    /// Creates a sink holding at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        MemorySink {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Returns a copy of the retained events, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    /// Number of retained events matching a severity and source
    pub fn count(&self, severity: Severity, source: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.severity == severity && e.source == source)
            .count()
    }

    /// Drops all retained events
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        MemorySink::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl EventSink for MemorySink {
    fn add_log(&self, message: &str, severity: Severity, source: &str) {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(Event {
            message: message.to_string(),
            severity,
            source: source.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_evicts_oldest() {
        let sink = MemorySink::with_capacity(2);
        sink.add_log("one", Severity::Info, SOURCE_LINK);
        sink.add_log("two", Severity::Warn, SOURCE_LINK);
        sink.add_log("three", Severity::Success, SOURCE_TIME);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "two");
        assert_eq!(events[1].severity, Severity::Success);
        assert_eq!(sink.count(Severity::Success, SOURCE_TIME), 1);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Success.to_string(), "SUCCESS");
        assert_eq!(Severity::Warn.to_string(), "WARN");
    }
}
