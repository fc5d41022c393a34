//! Core types shared by every Cloudplay layer.
//!
//! Identities ([`RoomId`], [`PeerId`]), what the emulator produces
//! ([`GameFrame`], [`AudioBlock`]), what peers receive ([`VideoFrame`],
//! [`AudioFrame`]) and what flows back into the emulator ([`InputEvent`]).

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Globally unique identifier for a room.
///
/// Either supplied by the caller (a room being resumed) or generated from
/// the game name with [`RoomId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Number of characters used for the short form in log fields.
    pub const SHORT_LEN: usize = 5;

    /// Game names are truncated to this many bytes inside generated ids.
    const MAX_TITLE_BYTES: usize = 16;

    /// Wraps an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a fresh id from a game name plus 64 random bits.
    ///
    /// Layout: `<16 hex digits>|<hex of the first 16 bytes of the name>`.
    pub fn generate(game_name: &str) -> Self {
        let salt: u64 = rand::rng().random();
        let title = &game_name.as_bytes()[..game_name.len().min(Self::MAX_TITLE_BYTES)];
        Self(format!("{salt:016x}|{}", hex::encode(title)))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first few characters, for log fields.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(Self::SHORT_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// Returns `true` for the empty id, which callers use to mean
    /// "generate one for me".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Stable identity of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Emulator output
// ---------------------------------------------------------------------------

/// One decoded video frame as produced by the emulator core.
///
/// This is also the record type carried over the frame import socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFrame {
    /// Raw image payload.
    pub data: Vec<u8>,
    /// Presentation timestamp.
    pub timestamp: u32,
}

impl GameFrame {
    pub fn new(data: Vec<u8>, timestamp: u32) -> Self {
        Self { data, timestamp }
    }
}

/// A block of interleaved PCM samples as produced by the emulator core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioBlock(pub Vec<i16>);

impl AudioBlock {
    pub fn samples(&self) -> &[i16] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Peer-facing media
// ---------------------------------------------------------------------------

/// An encoded video frame queued for one peer.
///
/// `Bytes` makes the per-peer clone in fan-out a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub data: Bytes,
    pub timestamp: u32,
}

/// An encoded audio frame queued for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Bytes,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A peer's raw controller state, tagged with who sent it.
///
/// The emulator core receives every player's input through a single
/// channel of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Raw input payload as sent by the client.
    pub raw_state: Vec<u8>,
    /// Player slot currently assigned to the sender.
    pub player_index: usize,
    /// The sending peer.
    pub conn_id: PeerId,
}

impl InputEvent {
    /// Payload telling the core that a peer has left and its per-player
    /// state can be released.
    pub const DETACH: [u8; 2] = [0xFF, 0xFF];

    /// Builds the detach sentinel for `conn_id`.
    pub fn detach(conn_id: PeerId) -> Self {
        Self {
            raw_state: Self::DETACH.to_vec(),
            player_index: 0,
            conn_id,
        }
    }

    /// Returns `true` if this is a detach sentinel.
    pub fn is_detach(&self) -> bool {
        self.raw_state == Self::DETACH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_generate_is_unique_and_tagged() {
        let a = RoomId::generate("Super Mario Bros");
        let b = RoomId::generate("Super Mario Bros");
        assert_ne!(a, b);
        let (salt, title) = a.as_str().split_once('|').unwrap();
        assert_eq!(salt.len(), 16);
        assert_eq!(title, hex::encode("Super Mario Bros"));
    }

    #[test]
    fn test_room_id_generate_truncates_long_names() {
        let id = RoomId::generate("The Legend of Zelda: A Link to the Past");
        let (_, title) = id.as_str().split_once('|').unwrap();
        assert_eq!(title.len(), 32);
    }

    #[test]
    fn test_room_id_short() {
        assert_eq!(RoomId::new("abcdef123").short(), "abcde");
        assert_eq!(RoomId::new("abc").short(), "abc");
        assert_eq!(RoomId::new("ééééééé").short(), "ééééé");
    }

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId(7).to_string(), "peer-7");
    }

    #[test]
    fn test_detach_sentinel() {
        let event = InputEvent::detach(PeerId(3));
        assert!(event.is_detach());
        assert_eq!(event.conn_id, PeerId(3));

        let normal = InputEvent {
            raw_state: vec![0x01, 0x00],
            player_index: 1,
            conn_id: PeerId(3),
        };
        assert!(!normal.is_detach());
    }
}
