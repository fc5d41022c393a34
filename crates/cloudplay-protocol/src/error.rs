//! Error types for the protocol layer.
//!
//! Each crate in Cloudplay defines its own error enum. A `ProtocolError`
//! always means the bytes were wrong: a record that could not be encoded,
//! decoded, or framed.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// MessagePack serialization failed.
    #[error("encode failed: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    ///
    /// Common causes: a truncated record, or a producer and consumer that
    /// disagree on the record layout.
    #[error("decode failed: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    JsonEncode(serde_json::Error),

    /// JSON deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    JsonDecode(serde_json::Error),

    /// A record header announced more bytes than the framing allows.
    #[error("record of {len} bytes exceeds limit of {max}")]
    RecordTooLarge { len: usize, max: usize },

    /// The record stream violates the framing contract in some other way.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
