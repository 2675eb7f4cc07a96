//! Protocol implementation module
//!
//! This module defines the peer's line protocol: framing, the channel tag
//! tables, the date/time reply shapes, the address push encoding and the
//! fault/baud command family.

pub mod codec;
pub mod fault;
pub mod parser;
pub mod push;
pub mod tag;

pub use self::codec::FrameCodec;
pub use self::parser::{DateValue, FrameShape, Reading, ResponseParser, TimeValue};
pub use self::push::{ConfigPushEncoder, ServerSlot};
pub use self::tag::{ChannelTag, FieldTag};
