//! Error types for the room layer.

use cloudplay_protocol::{PeerId, RoomId};
use cloudplay_session::SessionError;
use cloudplay_transport::TransportError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room has been closed; nothing more can be done with it.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// The emulator core is not up (yet, or setup failed).
    #[error("emulator core of room {0} is unavailable")]
    CoreUnavailable(RoomId),

    /// No configured core can run the game.
    #[error("no core configured for game {0:?}")]
    NoCore(String),

    /// The peer is not in any room.
    #[error("{0} is not in a room")]
    PeerNotInRoom(PeerId),

    #[error(transparent)]
    Director(#[from] DirectorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("local save file: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking director call panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// Errors reported by an emulator core.
#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    #[error("core failed to spawn: {0}")]
    Spawn(String),

    #[error("failed to read game metadata: {0}")]
    Metadata(String),

    #[error("save failed: {0}")]
    Save(String),

    #[error("load failed: {0}")]
    Load(String),

    #[error("the core has no multitap support")]
    MultitapUnsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reported by durable save storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}
