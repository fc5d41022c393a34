//! `Worker`: the rooms of one process, shared across tasks.
//!
//! Ties the layers together for an embedding application: config →
//! room manager → rooms. Peer transports stay with the application; it
//! hands the worker [`PeerSession`]s.

use std::path::Path;
use std::sync::Arc;

use cloudplay_protocol::RoomId;
use cloudplay_room::{
    CloudStorage, EmulatorBackend, GameMetadata, Room, RoomError, RoomManager, WorkerConfig,
};
use cloudplay_session::PeerSession;
use tokio::sync::Mutex;

use crate::{CloudplayError, load_config};

/// Builder for configuring a [`Worker`].
///
/// ```rust,ignore
/// let worker = WorkerBuilder::new()
///     .config_file("worker.toml")?
///     .build(my_backend, FsStorage::new("/var/lib/cloudplay/cloud"));
/// let room = worker.open_room(None, game).await;
/// ```
#[derive(Debug, Default)]
pub struct WorkerBuilder {
    config: WorkerConfig,
}

impl WorkerBuilder {
    /// Creates a builder with the default config.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the config with the TOML document at `path`.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self, CloudplayError> {
        self.config = load_config(path)?;
        Ok(self)
    }

    pub fn build<B, S>(self, backend: B, storage: S) -> Worker<B, S>
    where
        B: EmulatorBackend,
        S: CloudStorage,
    {
        let config = Arc::new(self.config);
        Worker {
            rooms: Mutex::new(RoomManager::new(
                Arc::new(backend),
                Arc::new(storage),
                Arc::clone(&config),
            )),
            config,
        }
    }
}

/// All rooms of a worker process.
///
/// Cheap to share as `Arc<Worker<..>>`; every method takes `&self`.
pub struct Worker<B, S> {
    config: Arc<WorkerConfig>,
    rooms: Mutex<RoomManager<B, S>>,
}

impl<B: EmulatorBackend, S: CloudStorage> Worker<B, S> {
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Opens a room, or returns the open room with the same id.
    pub async fn open_room(&self, id: Option<RoomId>, game: GameMetadata) -> Room {
        self.rooms.lock().await.create_room(id, game)
    }

    pub async fn room(&self, id: &RoomId) -> Option<Room> {
        self.rooms.lock().await.room(id)
    }

    /// Puts `peer` into room `id` and returns the room.
    pub async fn join(&self, peer: Arc<PeerSession>, id: &RoomId) -> Result<Room, CloudplayError> {
        let mut rooms = self.rooms.lock().await;
        rooms.join_room(peer, id).await?;
        rooms
            .room(id)
            .ok_or_else(|| RoomError::NotFound(id.clone()).into())
    }

    /// Takes `peer` out of its room; the room closes if nobody connected
    /// is left.
    pub async fn leave(&self, peer: &PeerSession) -> Result<(), CloudplayError> {
        self.rooms.lock().await.leave_room(peer).await?;
        Ok(())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.room_count()
    }

    /// Closes every room and waits until each has released its core.
    pub async fn shutdown(&self) {
        let rooms = self.rooms.lock().await.close_all();
        tracing::info!(rooms = rooms.len(), "worker shutting down");
        for room in rooms {
            room.wait_closed().await;
        }
    }
}
