//! Error types for the session layer.

use cloudplay_protocol::{PeerId, RoomId};

/// Errors that can occur while registering peers with a room.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer is already a member of this room's registry.
    #[error("{0} already in room {1}")]
    AlreadyInRoom(PeerId, RoomId),

    /// The peer is attached to a different room.
    /// A peer belongs to at most one room at a time.
    #[error("{peer} is attached to room {current}, cannot join {requested}")]
    AttachedElsewhere {
        peer: PeerId,
        current: RoomId,
        requested: RoomId,
    },

    /// The room is shutting down and takes no new members.
    #[error("room {0} is shutting down")]
    ShutDown(RoomId),
}
