//! Peer sessions for Cloudplay.
//!
//! This crate tracks who is connected to a room:
//!
//! 1. **Peer handles**: [`PeerSession`] (room side) and [`PeerEndpoint`]
//!    (transport side) of a single remote viewer/player
//! 2. **Registry**: the ordered set of peers in one room ([`SessionRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← fans media out to, and polls input from, registered peers
//!     ↕
//! Session Layer (this crate)  ← peer identity, connectivity, room membership
//!     ↕
//! Protocol Layer (below)  ← PeerId, RoomId, media and input types
//! ```

mod error;
mod peer;
mod registry;

pub use error::SessionError;
pub use peer::{PeerConfig, PeerEndpoint, PeerSession};
pub use registry::SessionRegistry;
