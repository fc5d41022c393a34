//! Wire-level vocabulary for Cloudplay.
//!
//! - **Types** ([`RoomId`], [`PeerId`], [`GameFrame`], [`InputEvent`], ...):
//!   the values that move between emulator, room and peers.
//! - **Codec** ([`Codec`], [`MsgPackCodec`], [`JsonCodec`]): how a single
//!   record is turned into bytes.
//! - **Framing** ([`RecordFraming`], [`RecordReassembler`]): how records
//!   are delimited on a byte stream.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Framing (records) → Codec (GameFrame) → Room
//! ```

mod codec;
mod error;
pub mod framing;
mod types;

pub use codec::{Codec, MsgPackCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use framing::{RecordFraming, RecordReassembler, encode_record};
pub use types::{AudioBlock, AudioFrame, GameFrame, InputEvent, PeerId, RoomId, VideoFrame};
