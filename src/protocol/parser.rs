//! Date/time response parsing
//!
//! Peer firmware revisions answer a time request in one of three shapes,
//! tried in this order:
//!
//! 1. tagged: `DATE:ddmmyy` and `TIME:hhmmss` anywhere in the frame
//! 2. fixed width: exactly 12 characters, `ddmmyyhhmmss`
//! 3. single field: exactly 7 characters, 6 digits plus a letter whose case
//!    selects date (upper) or time (lower)
//!
//! Out-of-range values still parse; the field is then [`DateValue::Invalid`]
//! or [`TimeValue::Invalid`] and unusable downstream.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::tag::FieldTag;
use crate::core::types::is_printable;
use crate::core::{Error, Result};

/// Marker preceding the date payload in the tagged shape
pub const DATE_MARKER: &str = "DATE:";
/// Marker preceding the time payload in the tagged shape
pub const TIME_MARKER: &str = "TIME:";

const PAYLOAD_LEN: usize = 6;
const INVALID: &str = "invalid";

/// A calendar date as reported by the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateValue {
    Valid { day: u8, month: u8, year: u16 },
    Invalid,
}

impl DateValue {
    /// Parses a `ddmmyy` payload. Wrong length is an error; out-of-range
    /// values yield `Invalid`.
    pub fn parse(payload: &str) -> Result<Self> {
        let [day, month, yy] = split_pairs(payload)?;
        let (Some(day), Some(month), Some(yy)) = (day, month, yy) else {
            return Ok(DateValue::Invalid);
        };
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return Ok(DateValue::Invalid);
        }
        Ok(DateValue::Valid {
            day,
            month,
            year: 2000 + u16::from(yy),
        })
    }

    /// Whether the value can be used
    pub fn is_valid(&self) -> bool {
        matches!(self, DateValue::Valid { .. })
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Valid { day, month, year } => {
                write!(f, "{:02}.{:02}.{:04}", day, month, year)
            }
            DateValue::Invalid => f.write_str(INVALID),
        }
    }
}

/// A time of day as reported by the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeValue {
    Valid { hour: u8, minute: u8, second: u8 },
    Invalid,
}

impl TimeValue {
    /// Parses an `hhmmss` payload. Wrong length is an error; out-of-range
    /// values yield `Invalid`.
    pub fn parse(payload: &str) -> Result<Self> {
        let [hour, minute, second] = split_pairs(payload)?;
        let (Some(hour), Some(minute), Some(second)) = (hour, minute, second) else {
            return Ok(TimeValue::Invalid);
        };
        if hour > 23 || minute > 59 || second > 59 {
            return Ok(TimeValue::Invalid);
        }
        Ok(TimeValue::Valid {
            hour,
            minute,
            second,
        })
    }

    /// Whether the value can be used
    pub fn is_valid(&self) -> bool {
        matches!(self, TimeValue::Valid { .. })
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Valid {
                hour,
                minute,
                second,
            } => write!(f, "{:02}:{:02}:{:02}", hour, minute, second),
            TimeValue::Invalid => f.write_str(INVALID),
        }
    }
}

/// Splits a 6-character payload into three two-digit numbers. A pair that
/// is not two ASCII digits becomes `None`.
fn split_pairs(payload: &str) -> Result<[Option<u8>; 3]> {
    if payload.len() != PAYLOAD_LEN || !payload.is_ascii() {
        return Err(Error::malformed(format!(
            "expected {} characters, got {:?}",
            PAYLOAD_LEN, payload
        )));
    }
    let pair = |i: usize| {
        let digits = &payload.as_bytes()[i..i + 2];
        if digits.iter().all(u8::is_ascii_digit) {
            Some((digits[0] - b'0') * 10 + (digits[1] - b'0'))
        } else {
            None
        }
    };
    Ok([pair(0), pair(2), pair(4)])
}

/// Frame shape a reading was recognized from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShape {
    Tagged,
    FixedWidth,
    SingleField,
}

/// One parsed date/time observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Date and time in one frame
    Full { date: DateValue, time: TimeValue },
    /// Date half of a two-frame reading
    DateOnly(DateValue),
    /// Time half of a two-frame reading; by convention sent after the date
    TimeOnly(TimeValue),
}

impl Reading {
    /// Whether this observation completes a reading on its own
    pub fn is_complete(&self) -> bool {
        !matches!(self, Reading::DateOnly(_))
    }

    /// The date carried, if any
    pub fn date(&self) -> Option<DateValue> {
        match self {
            Reading::Full { date, .. } | Reading::DateOnly(date) => Some(*date),
            Reading::TimeOnly(_) => None,
        }
    }

    /// The time carried, if any
    pub fn time(&self) -> Option<TimeValue> {
        match self {
            Reading::Full { time, .. } | Reading::TimeOnly(time) => Some(*time),
            Reading::DateOnly(_) => None,
        }
    }
}

/// Recognizes date/time frames
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Creates a parser
    pub fn new() -> Self {
        ResponseParser
    }

    /// Parses a frame, trying the tagged, fixed-width and single-field
    /// shapes in that order
    pub fn parse(&self, frame: &str) -> Result<(FrameShape, Reading)> {
        if let Some(reading) = self.parse_tagged(frame) {
            return Ok((FrameShape::Tagged, reading));
        }
        if let Some(reading) = self.parse_fixed_width(frame) {
            return Ok((FrameShape::FixedWidth, reading));
        }
        if let Some(reading) = self.parse_single_field(frame) {
            return Ok((FrameShape::SingleField, reading));
        }
        Err(Error::malformed(format!("unrecognized time format: {:?}", frame)))
    }

    fn parse_tagged(&self, frame: &str) -> Option<Reading> {
        let date = payload_after(frame, DATE_MARKER)?;
        let time = payload_after(frame, TIME_MARKER)?;
        Some(Reading::Full {
            date: DateValue::parse(date).ok()?,
            time: TimeValue::parse(time).ok()?,
        })
    }

    fn parse_fixed_width(&self, frame: &str) -> Option<Reading> {
        if frame.len() != 2 * PAYLOAD_LEN || !frame.bytes().all(is_printable) {
            return None;
        }
        let (date, time) = frame.split_at(PAYLOAD_LEN);
        Some(Reading::Full {
            date: DateValue::parse(date).ok()?,
            time: TimeValue::parse(time).ok()?,
        })
    }

    fn parse_single_field(&self, frame: &str) -> Option<Reading> {
        if frame.len() != PAYLOAD_LEN + 1 || !frame.is_ascii() {
            return None;
        }
        let (payload, letter) = frame.split_at(PAYLOAD_LEN);
        match FieldTag::decode(letter.chars().next()?)? {
            FieldTag::Date(_) => DateValue::parse(payload).ok().map(Reading::DateOnly),
            FieldTag::Time(_) => TimeValue::parse(payload).ok().map(Reading::TimeOnly),
        }
    }
}

fn payload_after<'a>(frame: &'a str, marker: &str) -> Option<&'a str> {
    let start = frame.find(marker)? + marker.len();
    frame.get(start..start + PAYLOAD_LEN)
}

/// Combines a date and a time into a calendar timestamp when both are valid
/// and the date exists in the calendar
pub fn to_datetime(date: DateValue, time: TimeValue) -> Option<NaiveDateTime> {
    let (
        DateValue::Valid { day, month, year },
        TimeValue::Valid {
            hour,
            minute,
            second,
        },
    ) = (date, time)
    else {
        return None;
    };
    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))?;
    let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))?;
    Some(NaiveDateTime::new(date, time))
}
