use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::types::is_printable;
use crate::core::{Command, Error, ResponseFrame, MAX_FRAME_LEN};

/// Line codec for the peer protocol
///
/// Outbound commands are written verbatim, without a terminator. Inbound
/// bytes are accumulated until `\n` or `\r`, or until the frame reaches the
/// maximum length. Non-printable bytes are dropped and leading terminators
/// are skipped. A frame that ends without a terminator (the fixed-width
/// shapes) is released by [`Decoder::decode_eof`] once the caller has seen
/// the link go quiet.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Bytes of the frame being assembled
    pending: BytesMut,
    /// Maximum frame length
    max_len: usize,
}

impl FrameCodec {
    /// Creates a codec with the default maximum frame length
    pub fn new() -> Self {
        FrameCodec::with_max_len(MAX_FRAME_LEN)
    }

    /// Creates a codec with a custom maximum frame length
    pub fn with_max_len(max_len: usize) -> Self {
        let max_len = max_len.clamp(1, MAX_FRAME_LEN);
        FrameCodec {
            pending: BytesMut::with_capacity(max_len),
            max_len,
        }
    }

    /// Whether part of a frame has been accumulated
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drops any partially accumulated frame
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    fn take_frame(&mut self) -> Option<ResponseFrame> {
        let frame = ResponseFrame::from_printable(&self.pending);
        self.pending.clear();
        frame
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new()
    }
}

impl Decoder for FrameCodec {
    type Item = ResponseFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            match byte {
                b'\n' | b'\r' => {
                    if self.has_partial() {
                        return Ok(self.take_frame());
                    }
                }
                b if is_printable(b) => {
                    self.pending.extend_from_slice(&[b]);
                    if self.pending.len() >= self.max_len {
                        return Ok(self.take_frame());
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        Ok(self.take_frame())
    }
}

impl Encoder<Command> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

impl<'a> Encoder<&'a Command> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: &'a Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
