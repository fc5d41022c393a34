//! Unified error type for Cloudplay.

use std::path::PathBuf;

use cloudplay_protocol::ProtocolError;
use cloudplay_room::RoomError;
use cloudplay_session::SessionError;
use cloudplay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CloudplayError {
    /// Frame import socket errors.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode and framing errors.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Peer membership errors.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Room, core and storage errors.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The config file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config document is not valid.
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
}
