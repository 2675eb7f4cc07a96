//! Fault log and link-rate command family

use std::time::Duration;

use super::tag::ChannelTag;
use crate::core::{Command, Error, Result};

/// Command that asks for the number of stored fault records
pub const FAULT_COUNT_COMMAND: &str = "AN";

/// Highest fault index the peer accepts
pub const MAX_FAULT_INDEX: u32 = 9999;

/// Reply budget for the fault count query
pub const FAULT_COUNT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Reply budget for one fault record
pub const FAULT_RECORD_TIMEOUT: Duration = Duration::from_millis(3000);

/// Reply budget for a baud rate change
pub const BAUD_RATE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Reply the peer sends for an empty fault slot
const NO_RECORD: &str = "E";

/// Builds the fault count query
pub fn fault_count_command() -> Result<Command> {
    Command::new(FAULT_COUNT_COMMAND)
}

/// Parses an `A<n>` reply. The peer reports one more than the number of
/// stored records.
pub fn parse_fault_count(frame: &str) -> Result<u32> {
    let digits = frame
        .strip_prefix('A')
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| Error::malformed(format!("fault count reply {:?}", frame)))?;
    let reported: u32 = digits
        .trim()
        .parse()
        .map_err(|_| Error::malformed(format!("fault count reply {:?}", frame)))?;
    reported
        .checked_sub(1)
        .ok_or_else(|| Error::malformed(format!("fault count reply {:?}", frame)))
}

/// Builds the query for fault record `index` (1-based)
pub fn fault_record_command(index: u32) -> Result<Command> {
    if !(1..=MAX_FAULT_INDEX).contains(&index) {
        return Err(Error::invalid_command(format!(
            "fault index {} outside 1..={}",
            index, MAX_FAULT_INDEX
        )));
    }
    let tag = ChannelTag::FaultIndex;
    Command::new(format!(
        "{:0width$}{}",
        index,
        tag.suffix(),
        width = tag.payload_width()
    ))
}

/// Whether a fault record reply carries a record
pub fn is_fault_record(frame: &str) -> bool {
    !frame.is_empty() && frame != NO_RECORD
}

/// Peer link rates and their selector digits
const BAUD_SELECTORS: &[(u32, u8)] = &[
    (9_600, 0),
    (19_200, 1),
    (38_400, 2),
    (57_600, 3),
    (115_200, 4),
];

/// Builds the command that switches the peer to `baud_rate`
pub fn baud_rate_command(baud_rate: u32) -> Result<Command> {
    let (_, selector) = BAUD_SELECTORS
        .iter()
        .find(|(rate, _)| *rate == baud_rate)
        .ok_or_else(|| Error::invalid_command(format!("unsupported baud rate {}", baud_rate)))?;
    Command::new(format!("{}{}", selector, ChannelTag::BaudRate.suffix()))
}

/// Whether the peer acknowledged a baud rate change explicitly
pub fn is_explicit_ack(frame: &str) -> bool {
    frame == "ACK" || frame.contains("OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_count_command() {
        assert_eq!(fault_count_command().unwrap().as_str(), "AN");
    }

    #[test]
    fn test_fault_count_reply() {
        assert_eq!(parse_fault_count("A50").unwrap(), 49);
        assert_eq!(parse_fault_count("A1").unwrap(), 0);
        assert!(parse_fault_count("A0").is_err());
        assert!(parse_fault_count("A").is_err());
        assert!(parse_fault_count("B12").is_err());
        assert!(parse_fault_count("Axy").is_err());
    }

    #[test]
    fn test_fault_record_command() {
        assert_eq!(fault_record_command(1).unwrap().as_str(), "00001v");
        assert_eq!(fault_record_command(9999).unwrap().as_str(), "09999v");
        assert!(fault_record_command(0).is_err());
        assert!(fault_record_command(10_000).is_err());
    }

    #[test]
    fn test_fault_record_reply() {
        assert!(is_fault_record("P12;2025-01-01;..."));
        assert!(!is_fault_record("E"));
        assert!(!is_fault_record(""));
    }

    #[test]
    fn test_baud_rate_command() {
        assert_eq!(baud_rate_command(9600).unwrap().as_str(), "0Br");
        assert_eq!(baud_rate_command(115_200).unwrap().as_str(), "4Br");
        assert!(matches!(
            baud_rate_command(250_000),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_ack_detection() {
        assert!(is_explicit_ack("ACK"));
        assert!(is_explicit_ack("BAUD OK"));
        assert!(!is_explicit_ack("NAK"));
    }
}
