//! Length-prefixed frame codec
//!
//! Wire format: a 2-byte unsigned big-endian length, followed by exactly that
//! many payload bytes. The payload is an [`Envelope`] in little-endian order.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};
use tracing::trace;

use super::Envelope;
use crate::{KickoffError, Result};

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest payload the length prefix can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Tokio codec turning a byte stream into [`Envelope`]s and back.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_length(LENGTH_PREFIX_LEN)
            .big_endian()
            .max_frame_length(MAX_PAYLOAD_LEN)
            .new_codec();
        Self { inner }
    }

    /// Report whether `buf` holds at least one complete frame, without consuming it.
    pub fn has_complete_frame(buf: &[u8]) -> bool {
        if buf.len() < LENGTH_PREFIX_LEN {
            return false;
        }
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        buf.len() - LENGTH_PREFIX_LEN >= len
    }

    /// Encode an envelope payload, rejecting payloads the prefix cannot describe.
    pub fn encode_payload(envelope: &Envelope) -> Result<BytesMut> {
        let mut payload = BytesMut::new();
        envelope.encode_payload(&mut payload);
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(KickoffError::EncodingTooLarge {
                kind: envelope.kind(),
                size: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(payload)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Envelope;
    type Error = KickoffError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        match self.inner.decode(src)? {
            Some(payload) => {
                trace!(len = payload.len(), "Decoded frame");
                Envelope::decode_payload(payload.freeze()).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = KickoffError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&Envelope>>::encode(self, &envelope, dst)
    }
}

impl Encoder<&Envelope> for FrameCodec {
    type Error = KickoffError;

    fn encode(&mut self, envelope: &Envelope, dst: &mut BytesMut) -> Result<()> {
        // Size is checked before anything touches `dst`
        let payload = Self::encode_payload(envelope)?;
        trace!(kind = %envelope.kind(), len = payload.len(), "Encoding frame");
        self.inner.encode(payload.freeze(), dst)?;
        Ok(())
    }
}
