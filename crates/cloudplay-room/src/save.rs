//! Moving save files between the local disk and durable storage.

use std::path::Path;
use std::sync::Arc;

use cloudplay_protocol::RoomId;

use crate::storage::CloudStorage;
use crate::RoomError;

/// Restores and pushes the save of one room, and tells whether one exists.
#[derive(Debug)]
pub struct SaveCoordinator<S> {
    room_id: RoomId,
    storage: Arc<S>,
}

impl<S: CloudStorage> SaveCoordinator<S> {
    pub fn new(room_id: RoomId, storage: Arc<S>) -> Self {
        Self { room_id, storage }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Copies the stored blob, if any, to `path`.
    ///
    /// Returns `Ok(false)` when storage has nothing for this room.
    pub async fn restore_to_local(&self, path: &Path) -> Result<bool, RoomError> {
        let Some(blob) = self.storage.load(&self.room_id).await? else {
            return Ok(false);
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &blob).await?;
        tracing::debug!(
            room = %self.room_id.short(),
            bytes = blob.len(),
            path = %path.display(),
            "save restored to local disk"
        );
        Ok(true)
    }

    /// Uploads the local save at `path`.
    pub async fn push(&self, path: &Path) -> Result<(), RoomError> {
        self.storage.save(&self.room_id, path).await?;
        Ok(())
    }

    /// Returns `true` if storage has a blob for this room or the local
    /// save at `path` exists.
    pub async fn is_persisted(&self, path: &Path) -> bool {
        match self.storage.load(&self.room_id).await {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(e) => tracing::debug!(room = %self.room_id.short(), error = %e, "storage lookup failed"),
        }
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
