use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result, MAX_COMMAND_LEN, MAX_FRAME_LEN};

/// An outbound command frame: printable ASCII, 1 to 100 bytes, no terminators
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Validates and builds a command
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::invalid_command("command is empty"));
        }
        if text.len() > MAX_COMMAND_LEN {
            return Err(Error::invalid_command(format!(
                "command is {} bytes, limit is {}",
                text.len(),
                MAX_COMMAND_LEN
            )));
        }
        if let Some(bad) = text.bytes().find(|b| !is_printable(*b)) {
            return Err(Error::invalid_command(format!(
                "command contains non-printable byte 0x{:02x}",
                bad
            )));
        }
        Ok(Command(text))
    }

    /// Returns the command text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the bytes written to the link
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An inbound frame as accumulated from the link. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseFrame(String);

impl ResponseFrame {
    /// Builds a frame from accumulated printable bytes
    pub(crate) fn from_printable(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(ResponseFrame(bytes.iter().map(|&b| b as char).collect()))
    }

    /// Returns the frame text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Frames are never empty; provided for API symmetry
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a byte is printable ASCII (space through tilde)
pub fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}

/// Physical link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device path
    pub device: String,
    /// Baud rate (8N1)
    pub baud_rate: u32,
    /// Per-read timeout handed to the port driver
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: super::DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(10),
        }
    }
}

/// Exchange timing and framing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Timeout used when an exchange is requested with a zero timeout
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub default_timeout: Duration,
    /// Maximum inbound frame length
    pub max_frame_len: usize,
    /// Silence after data started that ends an unterminated frame
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub inactivity_gap: Duration,
    /// Wait before draining stale input
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub clear_delay: Duration,
    /// Wait between close and reopen, and after reopen
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub settle_delay: Duration,
    /// Quiet period after a completed reset
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub post_reset_delay: Duration,
    /// Polling period while waiting for bytes
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            default_timeout: Duration::from_millis(3000),
            max_frame_len: MAX_FRAME_LEN,
            inactivity_gap: Duration::from_millis(10),
            clear_delay: Duration::from_millis(50),
            settle_delay: Duration::from_millis(200),
            post_reset_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Periodic health check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Health check cadence
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub check_interval: Duration,
    /// Link silence that marks the link unhealthy
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub silence_threshold: Duration,
    /// Accumulated failures that force a reset
    pub error_threshold: u32,
    /// Command sent to probe an unhealthy link, if any
    pub probe_command: Option<String>,
    /// Timeout for the probe exchange
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            check_interval: Duration::from_secs(30),
            silence_threshold: Duration::from_secs(300),
            error_threshold: 5,
            probe_command: Some("AN".to_string()),
            probe_timeout: Duration::from_millis(2000),
        }
    }
}

/// Time synchronization schedule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retry interval while unsynchronized and under the fast-retry limit
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub fast_interval: Duration,
    /// Retry interval once the fast-retry limit is reached
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub slow_interval: Duration,
    /// Refresh interval while synchronized
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub refresh_interval: Duration,
    /// Maximum age of the last success before validity is revoked
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub staleness_window: Duration,
    /// Failures allowed at the fast interval
    pub fast_retry_limit: u32,
    /// Command that asks the peer for date and time
    pub request_command: String,
    /// Timeout for the time request
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub request_timeout: Duration,
    /// Only accept a time-only frame as complete after a date-only frame
    pub require_date_before_time: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            fast_interval: Duration::from_secs(5),
            slow_interval: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(300),
            staleness_window: Duration::from_secs(600),
            fast_retry_limit: 5,
            request_command: "GETTIME".to_string(),
            request_timeout: Duration::from_millis(2000),
            require_date_before_time: false,
        }
    }
}

/// Configuration push settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Timeout for each pushed frame
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub frame_timeout: Duration,
    /// Minimum spacing between consecutive pushed frames
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub inter_command_delay: Duration,
    /// Primary time server address
    pub primary_server: Option<String>,
    /// Secondary time server address
    pub secondary_server: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            frame_timeout: Duration::from_millis(1000),
            inter_command_delay: Duration::from_millis(50),
            primary_server: None,
            secondary_server: None,
        }
    }
}

/// Configuration for the field link controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Physical link
    pub link: LinkConfig,
    /// Exchange framing and timing
    pub transport: TransportConfig,
    /// Health monitoring
    pub health: HealthConfig,
    /// Time synchronization
    pub sync: SyncConfig,
    /// Configuration push
    pub push: PushConfig,
    /// Control loop iteration period
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub control_tick: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            link: LinkConfig::default(),
            transport: TransportConfig::default(),
            health: HealthConfig::default(),
            sync: SyncConfig::default(),
            push: PushConfig::default(),
            control_tick: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Loads a JSON configuration file; missing sections take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that timings and commands are usable
    pub fn validate(&self) -> Result<()> {
        if self.link.baud_rate == 0 {
            return Err(Error::config("baud rate must be positive"));
        }
        if self.transport.default_timeout.is_zero() {
            return Err(Error::config("default timeout must be positive"));
        }
        if self.transport.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be positive"));
        }
        if self.transport.max_frame_len == 0 || self.transport.max_frame_len > MAX_FRAME_LEN {
            return Err(Error::config(format!(
                "max frame length must be within 1..={}",
                MAX_FRAME_LEN
            )));
        }
        if self.health.check_interval.is_zero() {
            return Err(Error::config("health check interval must be positive"));
        }
        if let Some(probe) = &self.health.probe_command {
            Command::new(probe.as_str())
                .map_err(|e| Error::config(format!("probe command: {}", e)))?;
        }
        Command::new(self.sync.request_command.as_str())
            .map_err(|e| Error::config(format!("sync request command: {}", e)))?;
        if self.sync.fast_interval.is_zero()
            || self.sync.slow_interval.is_zero()
            || self.sync.refresh_interval.is_zero()
        {
            return Err(Error::config("sync intervals must be positive"));
        }
        if self.sync.staleness_window < self.sync.refresh_interval {
            return Err(Error::config(
                "staleness window must not be shorter than the refresh interval",
            ));
        }
        if self.control_tick.is_zero() {
            return Err(Error::config("control tick must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_validation() {
        assert!(Command::new("192168u").is_ok());
        assert!(Command::new("x".repeat(100)).is_ok());

        assert!(matches!(Command::new(""), Err(Error::InvalidCommand(_))));
        assert!(matches!(
            Command::new("x".repeat(101)),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::new("AN\n"),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::new("A\u{7f}"),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::new("zaman\u{e7}"),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_response_frame_never_empty() {
        assert!(ResponseFrame::from_printable(b"").is_none());
        let frame = ResponseFrame::from_printable(b"A50").unwrap();
        assert_eq!(frame.as_str(), "A50");
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.link.baud_rate, 250_000);
        assert_eq!(config.health.error_threshold, 5);
        assert_eq!(config.sync.staleness_window, Duration::from_secs(600));
        assert_eq!(config.control_tick, Duration::from_millis(100));
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{ "link": { "device": "/dev/ttyS2", "baud_rate": 250000, "read_timeout": 0.01 },
                        "push": { "frame_timeout": 1.0, "inter_command_delay": 0.05,
                                  "primary_server": "192.168.1.2", "secondary_server": null } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.link.device, "/dev/ttyS2");
        assert_eq!(config.push.primary_server.as_deref(), Some("192.168.1.2"));
        assert_eq!(config.sync.request_command, "GETTIME");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_probe() {
        let mut config = Config::default();
        config.health.probe_command = Some(String::new());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_short_staleness_window() {
        let mut config = Config::default();
        config.sync.staleness_window = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }
}
