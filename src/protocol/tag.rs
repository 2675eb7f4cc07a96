//! Channel tags
//!
//! The peer has no field separators or register addresses. A trailing
//! suffix on each frame selects the register (outbound) or the field
//! (inbound). Both directions go through the tables below.

use std::fmt;

/// Outbound register selector appended to a command payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTag {
    /// Primary time server, first two octets
    PrimaryHigh,
    /// Primary time server, last two octets
    PrimaryLow,
    /// Secondary time server, first two octets
    SecondaryHigh,
    /// Secondary time server, last two octets
    SecondaryLow,
    /// Fault record query by index
    FaultIndex,
    /// Peer baud rate selector
    BaudRate,
}

/// Encode table: tag, suffix, payload width in digits
const TAG_TABLE: &[(ChannelTag, &str, usize)] = &[
    (ChannelTag::PrimaryHigh, "u", 6),
    (ChannelTag::PrimaryLow, "y", 6),
    (ChannelTag::SecondaryHigh, "w", 6),
    (ChannelTag::SecondaryLow, "x", 6),
    (ChannelTag::FaultIndex, "v", 5),
    (ChannelTag::BaudRate, "Br", 1),
];

impl ChannelTag {
    /// All tags in table order
    pub const ALL: [ChannelTag; 6] = [
        ChannelTag::PrimaryHigh,
        ChannelTag::PrimaryLow,
        ChannelTag::SecondaryHigh,
        ChannelTag::SecondaryLow,
        ChannelTag::FaultIndex,
        ChannelTag::BaudRate,
    ];

    fn entry(self) -> (&'static str, usize) {
        TAG_TABLE
            .iter()
            .find(|(tag, _, _)| *tag == self)
            .map(|(_, suffix, width)| (*suffix, *width))
            .unwrap_or(("", 0))
    }

    /// Suffix appended to the payload on the wire
    pub fn suffix(self) -> &'static str {
        self.entry().0
    }

    /// Fixed payload width in digits for this command family
    pub fn payload_width(self) -> usize {
        self.entry().1
    }

    /// Recognizes the tag at the end of an outbound frame
    pub fn decode(frame: &str) -> Option<ChannelTag> {
        TAG_TABLE
            .iter()
            .filter(|(_, suffix, width)| frame.len() == width + suffix.len())
            .find(|(_, suffix, _)| frame.ends_with(suffix))
            .map(|(tag, _, _)| *tag)
    }
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Field selected by the case of the trailing letter of a 7-byte reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    /// Uppercase letter: the payload is a date
    Date(char),
    /// Lowercase letter: the payload is a time of day
    Time(char),
}

impl FieldTag {
    /// Decodes a tag letter; anything other than an ASCII letter is not a tag
    pub fn decode(letter: char) -> Option<FieldTag> {
        if letter.is_ascii_uppercase() {
            Some(FieldTag::Date(letter))
        } else if letter.is_ascii_lowercase() {
            Some(FieldTag::Time(letter))
        } else {
            None
        }
    }

    /// The letter as received
    pub fn letter(self) -> char {
        match self {
            FieldTag::Date(c) | FieldTag::Time(c) => c,
        }
    }
}
