use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::tag::ChannelTag;
use crate::core::{Command, Error, Result};

/// Configuration slot on the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSlot {
    Primary,
    Secondary,
}

impl ServerSlot {
    /// Tags carrying the high and low octet groups for this slot
    pub fn tags(self) -> (ChannelTag, ChannelTag) {
        match self {
            ServerSlot::Primary => (ChannelTag::PrimaryHigh, ChannelTag::PrimaryLow),
            ServerSlot::Secondary => (ChannelTag::SecondaryHigh, ChannelTag::SecondaryLow),
        }
    }
}

impl fmt::Display for ServerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerSlot::Primary => f.write_str("primary"),
            ServerSlot::Secondary => f.write_str("secondary"),
        }
    }
}

impl FromStr for ServerSlot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" | "1" => Ok(ServerSlot::Primary),
            "secondary" | "2" => Ok(ServerSlot::Secondary),
            other => Err(Error::config(format!("unknown server slot {:?}", other))),
        }
    }
}

/// Turns an IPv4 address into the peer's two-frame digit encoding
///
/// `192.168.1.2` in the primary slot becomes `192168u` followed by
/// `001002y`: each frame carries two octets as zero-padded 3-digit numbers
/// and a tag naming the slot half.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPushEncoder;

impl ConfigPushEncoder {
    /// Creates an encoder
    pub fn new() -> Self {
        ConfigPushEncoder
    }

    /// Parses a dotted address and encodes it for `slot`
    pub fn encode(&self, address: &str, slot: ServerSlot) -> Result<[Command; 2]> {
        let addr = parse_dotted(address)?;
        self.encode_addr(addr, slot)
    }

    /// Encodes an address for `slot`
    pub fn encode_addr(&self, addr: Ipv4Addr, slot: ServerSlot) -> Result<[Command; 2]> {
        let [o1, o2, o3, o4] = addr.octets();
        let (high, low) = slot.tags();
        Ok([
            Command::new(format!("{:03}{:03}{}", o1, o2, high.suffix()))?,
            Command::new(format!("{:03}{:03}{}", o3, o4, low.suffix()))?,
        ])
    }

    /// Recovers the address and slot from the two frames of a push
    pub fn decode(&self, high: &str, low: &str) -> Result<(Ipv4Addr, ServerSlot)> {
        let (o1, o2, high_tag) = split_group(high)?;
        let (o3, o4, low_tag) = split_group(low)?;
        let slot = [ServerSlot::Primary, ServerSlot::Secondary]
            .into_iter()
            .find(|slot| slot.tags() == (high_tag, low_tag))
            .ok_or_else(|| {
                Error::malformed(format!("tags {} and {} do not name one slot", high_tag, low_tag))
            })?;
        Ok((Ipv4Addr::new(o1, o2, o3, o4), slot))
    }
}

/// Strict dotted-quad parsing: four numeric segments, each 0..=255.
/// Leading zeros are accepted since the peer itself pads to three digits.
pub fn parse_dotted(address: &str) -> Result<Ipv4Addr> {
    let segments: Vec<&str> = address.trim().split('.').collect();
    if segments.len() != 4 {
        return Err(Error::invalid_address(format!(
            "{:?}: expected 4 dotted segments",
            address
        )));
    }
    let mut octets = [0u8; 4];
    for (octet, segment) in octets.iter_mut().zip(&segments) {
        if segment.is_empty()
            || segment.len() > 3
            || !segment.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::invalid_address(format!(
                "{:?}: segment {:?} is not numeric",
                address, segment
            )));
        }
        *octet = segment.parse().map_err(|_| {
            Error::invalid_address(format!("{:?}: segment {:?} exceeds 255", address, segment))
        })?;
    }
    Ok(Ipv4Addr::from(octets))
}

fn split_group(frame: &str) -> Result<(u8, u8, ChannelTag)> {
    let tag = ChannelTag::decode(frame)
        .filter(|tag| tag.payload_width() == 6)
        .ok_or_else(|| Error::malformed(format!("{:?} is not an address group", frame)))?;
    let octet = |range: std::ops::Range<usize>| {
        let digits = frame
            .get(range)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| Error::malformed(format!("{:?} is not an address group", frame)))?;
        digits
            .parse::<u8>()
            .map_err(|_| Error::malformed(format!("{:?} carries an octet above 255", frame)))
    };
    Ok((octet(0..3)?, octet(3..6)?, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_encoding() {
        let encoder = ConfigPushEncoder::new();
        let [first, second] = encoder.encode("192.168.1.2", ServerSlot::Primary).unwrap();
        assert_eq!(first.as_str(), "192168u");
        assert_eq!(second.as_str(), "001002y");
    }

    #[test]
    fn test_secondary_encoding() {
        let encoder = ConfigPushEncoder::new();
        let [first, second] = encoder.encode("8.8.4.4", ServerSlot::Secondary).unwrap();
        assert_eq!(first.as_str(), "008008w");
        assert_eq!(second.as_str(), "004004x");
    }

    #[test]
    fn test_rejects_bad_addresses() {
        let encoder = ConfigPushEncoder::new();
        for bad in ["192.168.1", "192.168..2", "a.b.c.d", "192.168.1.256", "1.2.3.4.5", "", "1.2.3.-4"] {
            assert!(
                matches!(
                    encoder.encode(bad, ServerSlot::Primary),
                    Err(Error::InvalidAddress(_))
                ),
                "address {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_round_trip_recovers_address() {
        let encoder = ConfigPushEncoder::new();
        for addr in ["0.0.0.0", "10.0.12.254", "255.255.255.255", "192.168.1.2"] {
            for slot in [ServerSlot::Primary, ServerSlot::Secondary] {
                let [high, low] = encoder.encode(addr, slot).unwrap();
                let (decoded, decoded_slot) = encoder.decode(high.as_str(), low.as_str()).unwrap();
                assert_eq!(decoded.to_string(), addr);
                assert_eq!(decoded_slot, slot);
            }
        }
    }

    #[test]
    fn test_decode_rejects_mixed_slots() {
        let encoder = ConfigPushEncoder::new();
        assert!(encoder.decode("192168u", "001002x").is_err());
        assert!(encoder.decode("192168u", "00001v").is_err());
        assert!(encoder.decode("999168u", "001002y").is_err());
    }

    #[test]
    fn test_decode_rejects_non_digit_groups() {
        let encoder = ConfigPushEncoder::new();
        // Seven bytes with a two-byte char straddling the octet boundary
        assert!(matches!(
            encoder.decode("12\u{e9}99u", "001002y"),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            encoder.decode("192168u", "0010\u{e9}y"),
            Err(Error::MalformedResponse(_))
        ));
        assert!(encoder.decode("+12168u", "001002y").is_err());
    }

    #[test]
    fn test_slot_parsing() {
        assert_eq!("primary".parse::<ServerSlot>().unwrap(), ServerSlot::Primary);
        assert_eq!("2".parse::<ServerSlot>().unwrap(), ServerSlot::Secondary);
        assert!("tertiary".parse::<ServerSlot>().is_err());
        assert_eq!(ServerSlot::Secondary.to_string(), "secondary");
    }
}
