//! Record framing for byte streams.
//!
//! A stream socket delivers bytes in whatever chunk sizes the kernel
//! chooses. [`RecordReassembler`] accumulates those chunks and hands back
//! whole records, leaving any partial trailing record buffered.
//!
//! Two envelopes are supported:
//!
//! ```text
//! LengthPrefixed:  [u32 LE payload length][payload] [u32 LE length][payload] ...
//! Fixed { size }:  [payload + padding: size bytes] [payload + padding: size bytes] ...
//! ```
//!
//! `Fixed` is the legacy contract where producer and consumer share a
//! record size constant; every record occupies exactly `size` bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{Codec, ProtocolError};

/// Size of the length header in [`RecordFraming::LengthPrefixed`] mode.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload accepted in [`RecordFraming::LengthPrefixed`] mode.
pub const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Record size used by legacy fixed-size producers.
pub const LEGACY_RECORD_SIZE: usize = 245_969;

/// How records are delimited on a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RecordFraming {
    /// Each payload is preceded by its length as a little-endian `u32`.
    #[default]
    LengthPrefixed,
    /// Every record is exactly `size` bytes, payload first.
    Fixed { size: usize },
}

impl RecordFraming {
    /// The legacy fixed-size contract.
    pub const fn legacy() -> Self {
        Self::Fixed {
            size: LEGACY_RECORD_SIZE,
        }
    }

    /// Wraps an already-encoded payload in this framing's envelope.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, ProtocolError> {
        match *self {
            Self::LengthPrefixed => {
                if payload.len() > MAX_RECORD_LEN {
                    return Err(ProtocolError::RecordTooLarge {
                        len: payload.len(),
                        max: MAX_RECORD_LEN,
                    });
                }
                let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
                buf.put_u32_le(payload.len() as u32);
                buf.put_slice(payload);
                Ok(buf.freeze())
            }
            Self::Fixed { size } => {
                if payload.len() > size {
                    return Err(ProtocolError::RecordTooLarge {
                        len: payload.len(),
                        max: size,
                    });
                }
                let mut buf = BytesMut::zeroed(size);
                buf[..payload.len()].copy_from_slice(payload);
                Ok(buf.freeze())
            }
        }
    }
}

/// Encodes `value` with `codec` and wraps it for the wire.
///
/// This is the producer half of the import protocol.
pub fn encode_record<C: Codec, T: Serialize>(
    codec: &C,
    framing: RecordFraming,
    value: &T,
) -> Result<Bytes, ProtocolError> {
    let payload = codec.encode(value)?;
    framing.frame(&payload)
}

/// Reassembles whole records out of arbitrarily sized chunks.
#[derive(Debug)]
pub struct RecordReassembler {
    framing: RecordFraming,
    buf: BytesMut,
}

impl RecordReassembler {
    pub fn new(framing: RecordFraming) -> Self {
        let capacity = match framing {
            RecordFraming::LengthPrefixed => 64 * 1024,
            RecordFraming::Fixed { size } => size * 2,
        };
        Self {
            framing,
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends a chunk read from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Splits the next whole record off the front of the buffer.
    ///
    /// Returns `Ok(None)` while only a partial record is buffered. For
    /// `LengthPrefixed` the returned bytes are the payload without its
    /// header; for `Fixed` they are the full padded slot.
    ///
    /// # Errors
    /// `RecordTooLarge` if a length header exceeds [`MAX_RECORD_LEN`]. The
    /// stream cannot be resynchronised after that.
    pub fn next_record(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        match self.framing {
            RecordFraming::LengthPrefixed => {
                if self.buf.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                    as usize;
                if len > MAX_RECORD_LEN {
                    return Err(ProtocolError::RecordTooLarge {
                        len,
                        max: MAX_RECORD_LEN,
                    });
                }
                if self.buf.len() < LENGTH_PREFIX_LEN + len {
                    return Ok(None);
                }
                self.buf.advance(LENGTH_PREFIX_LEN);
                Ok(Some(self.buf.split_to(len).freeze()))
            }
            RecordFraming::Fixed { size } => {
                if size == 0 {
                    return Err(ProtocolError::InvalidRecord(
                        "fixed record size must be non-zero".into(),
                    ));
                }
                if self.buf.len() < size {
                    return Ok(None);
                }
                Ok(Some(self.buf.split_to(size).freeze()))
            }
        }
    }

    /// Splits off and decodes the next whole record.
    pub fn next_value<C: Codec, T: serde::de::DeserializeOwned>(
        &mut self,
        codec: &C,
    ) -> Result<Option<T>, ProtocolError> {
        match self.next_record()? {
            Some(record) => codec.decode(&record).map(Some),
            None => Ok(None),
        }
    }

    /// Number of buffered bytes not yet consumed.
    pub fn residual(&self) -> usize {
        self.buf.len()
    }

    pub fn framing(&self) -> RecordFraming {
        self.framing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameFrame, MsgPackCodec};

    fn frames(n: u32) -> Vec<GameFrame> {
        (0..n)
            .map(|i| GameFrame::new(vec![i as u8; 100 + i as usize * 37], i * 16))
            .collect()
    }

    fn stream(framing: RecordFraming, frames: &[GameFrame]) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in frames {
            out.extend_from_slice(&encode_record(&MsgPackCodec, framing, frame).unwrap());
        }
        out
    }

    fn feed_in_chunks(
        framing: RecordFraming,
        bytes: &[u8],
        chunk: usize,
    ) -> (Vec<GameFrame>, usize) {
        let mut reassembler = RecordReassembler::new(framing);
        let mut decoded = Vec::new();
        for piece in bytes.chunks(chunk) {
            reassembler.extend(piece);
            while let Some(frame) = reassembler.next_value(&MsgPackCodec).unwrap() {
                decoded.push(frame);
            }
        }
        (decoded, reassembler.residual())
    }

    #[test]
    fn test_length_prefixed_reassembly_across_chunk_sizes() {
        let expected = frames(5);
        let bytes = stream(RecordFraming::LengthPrefixed, &expected);

        for chunk in [1, 3, 7, 64, 1000, bytes.len()] {
            let (decoded, residual) =
                feed_in_chunks(RecordFraming::LengthPrefixed, &bytes, chunk);
            assert_eq!(decoded, expected, "chunk size {chunk}");
            assert_eq!(residual, 0, "chunk size {chunk}");
        }
    }

    #[test]
    fn test_fixed_reassembly_across_chunk_sizes() {
        let framing = RecordFraming::Fixed { size: 512 };
        let expected = frames(4);
        let bytes = stream(framing, &expected);
        assert_eq!(bytes.len(), 4 * 512);

        for chunk in [1, 5, 511, 513, 2048] {
            let (decoded, residual) = feed_in_chunks(framing, &bytes, chunk);
            assert_eq!(decoded, expected, "chunk size {chunk}");
            assert_eq!(residual, 0);
        }
    }

    #[test]
    fn test_partial_trailing_record_stays_buffered() {
        let expected = frames(3);
        let mut bytes = stream(RecordFraming::LengthPrefixed, &expected);
        let extra = encode_record(&MsgPackCodec, RecordFraming::LengthPrefixed, &frames(1)[0])
            .unwrap();
        bytes.extend_from_slice(&extra[..extra.len() - 1]);

        let (decoded, residual) = feed_in_chunks(RecordFraming::LengthPrefixed, &bytes, 9);
        assert_eq!(decoded, expected);
        assert_eq!(residual, extra.len() - 1);
    }

    #[test]
    fn test_oversized_length_header_is_rejected() {
        let mut reassembler = RecordReassembler::new(RecordFraming::LengthPrefixed);
        reassembler.extend(&((MAX_RECORD_LEN as u32) + 1).to_le_bytes());
        assert!(matches!(
            reassembler.next_record(),
            Err(ProtocolError::RecordTooLarge { .. })
        ));
    }

    #[test]
    fn test_fixed_frame_rejects_payload_larger_than_slot() {
        let framing = RecordFraming::Fixed { size: 8 };
        assert!(matches!(
            framing.frame(&[0u8; 9]),
            Err(ProtocolError::RecordTooLarge { len: 9, max: 8 })
        ));
    }

    #[test]
    fn test_corrupt_payload_fails_decode() {
        let mut reassembler = RecordReassembler::new(RecordFraming::LengthPrefixed);
        let garbage = RecordFraming::LengthPrefixed.frame(&[0xC1, 0xC1, 0xC1]).unwrap();
        reassembler.extend(&garbage);
        let result: Result<Option<GameFrame>, _> = reassembler.next_value(&MsgPackCodec);
        assert!(result.is_err());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_framing_deserializes_from_config() {
        #[derive(serde::Deserialize)]
        struct Holder {
            framing: RecordFraming,
        }
        let h: Holder =
            serde_json::from_str(r#"{"framing":{"mode":"fixed","size":245969}}"#).unwrap();
        assert_eq!(h.framing, RecordFraming::legacy());
        let h: Holder = serde_json::from_str(r#"{"framing":{"mode":"length_prefixed"}}"#).unwrap();
        assert_eq!(h.framing, RecordFraming::LengthPrefixed);
    }
}
