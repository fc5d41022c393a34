//! Codec trait and implementations for serializing/deserializing records.
//!
//! A codec turns Rust values into a self-describing byte payload and back.
//! The framing layer (see [`crate::framing`]) decides where one payload
//! ends and the next begins; the codec only ever sees a single payload.
//!
//! [`MsgPackCodec`] is what the frame importer speaks. [`JsonCodec`] is
//! kept behind the `json` feature for debugging producers by hand.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs live inside long-running tasks
/// (the import listener owns one for its whole life).
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a value from the front of `data`.
    ///
    /// Bytes after the end of the value are ignored, which is what the
    /// fixed-size framing relies on: a record slot may be padded.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// MsgPackCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] using MessagePack with named struct fields.
///
/// Field names are written into every record, so a producer built from a
/// different revision of [`GameFrame`](crate::GameFrame) fails loudly
/// instead of being silently misread.
///
/// ```rust
/// use cloudplay_protocol::{Codec, GameFrame, MsgPackCodec};
///
/// let codec = MsgPackCodec;
/// let frame = GameFrame::new(vec![1, 2, 3], 90);
///
/// let bytes = codec.encode(&frame).unwrap();
/// let decoded: GameFrame = codec.decode(&bytes).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Much larger than MessagePack for image payloads, but readable in a
/// terminal. Unlike [`MsgPackCodec`], trailing bytes after the value are
/// rejected, so it only pairs with length-prefixed framing.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::JsonEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::JsonDecode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameFrame, InputEvent, PeerId};

    #[test]
    fn test_msgpack_decode_ignores_trailing_padding() {
        let codec = MsgPackCodec;
        let frame = GameFrame::new(vec![7; 16], 3);
        let mut bytes = codec.encode(&frame).unwrap();
        bytes.extend_from_slice(&[0u8; 32]);

        let decoded: GameFrame = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_msgpack_decode_truncated_is_error() {
        let codec = MsgPackCodec;
        let bytes = codec.encode(&GameFrame::new(vec![1; 64], 0)).unwrap();
        let result: Result<GameFrame, _> = codec.decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(ProtocolError::MsgPackDecode(_))));
    }

    #[test]
    fn test_msgpack_decode_wrong_shape_is_error() {
        let codec = MsgPackCodec;
        let event = InputEvent::detach(PeerId(4));
        let bytes = codec.encode(&event).unwrap();
        let result: Result<GameFrame, _> = codec.decode(&bytes);
        assert!(result.is_err());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_codec_is_readable() {
        let codec = JsonCodec;
        let bytes = codec.encode(&GameFrame::new(vec![1, 2], 5)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"timestamp\":5"));
    }
}
