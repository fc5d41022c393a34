//! Local socket transports for Cloudplay.
//!
//! Peer connections (WebRTC and friends) are owned by the embedding
//! application. What lives here is the one transport the room itself
//! drives: the headless [`FrameImportListener`], through which an
//! out-of-process renderer streams video frames into a room.

mod error;
mod import;

pub use error::TransportError;
pub use import::{
    FRAME_CHANNEL_CAPACITY, FrameImportListener, MAX_CONSECUTIVE_READ_ERRORS, import_frames,
    socket_path,
};
