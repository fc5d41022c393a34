//! Room manager: opens, tracks, and routes peers to rooms.

use std::collections::HashMap;
use std::sync::Arc;

use cloudplay_protocol::{PeerId, RoomId};
use cloudplay_session::{PeerSession, SessionError};

use crate::config::{GameMetadata, WorkerConfig};
use crate::director::EmulatorBackend;
use crate::storage::CloudStorage;
use crate::{Room, RoomError};

/// Manages all open rooms of a worker and tracks which peer is in which
/// room.
///
/// This is the entry point for room operations from higher layers (the
/// signalling side that accepts peers).
pub struct RoomManager<B, S> {
    backend: Arc<B>,
    storage: Arc<S>,
    config: Arc<WorkerConfig>,

    /// Open rooms, keyed by room ID.
    rooms: HashMap<RoomId, Room>,

    /// Maps each peer to the room it is currently in.
    /// A peer can be in at most ONE room at a time.
    peer_rooms: HashMap<PeerId, RoomId>,
}

impl<B: EmulatorBackend, S: CloudStorage> RoomManager<B, S> {
    pub fn new(backend: Arc<B>, storage: Arc<S>, config: Arc<WorkerConfig>) -> Self {
        Self {
            backend,
            storage,
            config,
            rooms: HashMap::new(),
            peer_rooms: HashMap::new(),
        }
    }

    /// Opens a room for `game`, or returns the open room with the same id.
    ///
    /// A closed room still registered under `id` is replaced.
    pub fn create_room(&mut self, id: Option<RoomId>, game: GameMetadata) -> Room {
        if let Some(room) = id.as_ref().and_then(|id| self.rooms.get(id)) {
            if room.is_running() {
                return room.clone();
            }
        }

        let room = Room::open(
            id,
            game,
            Arc::clone(&self.backend),
            Arc::clone(&self.storage),
            Arc::clone(&self.config),
        );
        let room_id = room.id().clone();
        self.peer_rooms.retain(|_, rid| *rid != room_id);
        self.rooms.insert(room_id.clone(), room.clone());
        tracing::info!(room = %room_id.short(), rooms = self.rooms.len(), "room created");
        room
    }

    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        self.rooms.get(room_id).cloned()
    }

    /// Adds a peer to a room.
    ///
    /// Enforces the "one room at a time" invariant.
    pub async fn join_room(
        &mut self,
        peer: Arc<PeerSession>,
        room_id: &RoomId,
    ) -> Result<(), RoomError> {
        if let Some(current) = self.peer_rooms.get(&peer.id()) {
            let err = if current == room_id {
                SessionError::AlreadyInRoom(peer.id(), room_id.clone())
            } else {
                SessionError::AttachedElsewhere {
                    peer: peer.id(),
                    current: current.clone(),
                    requested: room_id.clone(),
                }
            };
            return Err(err.into());
        }

        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        let peer_id = peer.id();
        room.add_peer(peer).await?;
        self.peer_rooms.insert(peer_id, room_id.clone());
        Ok(())
    }

    /// Removes a peer from its current room. A room left without any
    /// connected peer is closed.
    pub async fn leave_room(&mut self, peer: &PeerSession) -> Result<(), RoomError> {
        let room_id = self
            .peer_rooms
            .remove(&peer.id())
            .ok_or(RoomError::PeerNotInRoom(peer.id()))?;

        let Some(room) = self.rooms.get(&room_id) else {
            return Ok(());
        };
        room.remove_peer(peer).await;

        if !room.has_active_connection().await {
            tracing::info!(room = %room_id.short(), "no connected peers left");
            self.close_room(&room_id)?;
        }
        Ok(())
    }

    /// Closes a room and removes all its peers from the index.
    pub fn close_room(&mut self, room_id: &RoomId) -> Result<(), RoomError> {
        let room = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        room.close();
        self.peer_rooms.retain(|_, rid| rid != room_id);

        tracing::info!(room = %room_id.short(), "room closed");
        Ok(())
    }

    /// Closes every room. Returns the handles so callers can wait for the
    /// rooms to finish closing.
    pub fn close_all(&mut self) -> Vec<Room> {
        self.peer_rooms.clear();
        let rooms: Vec<Room> = self.rooms.drain().map(|(_, room)| room).collect();
        for room in &rooms {
            room.close();
        }
        tracing::info!(rooms = rooms.len(), "all rooms closed");
        rooms
    }

    /// Returns the room a peer is currently in, if any.
    pub fn peer_room(&self, peer_id: PeerId) -> Option<RoomId> {
        self.peer_rooms.get(&peer_id).cloned()
    }

    /// Returns the number of open rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Lists all open room IDs.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }
}
