//! Durable save storage.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use cloudplay_protocol::RoomId;

use crate::StorageError;

/// Remote (or at least longer-lived than the worker) home of save blobs,
/// addressed by room id.
pub trait CloudStorage: Send + Sync + 'static {
    /// Fetches the blob for `room_id`; `Ok(None)` when there is none.
    fn load(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StorageError>> + Send;

    /// Uploads the file at `local_path` as the blob for `room_id`.
    fn save(
        &self,
        room_id: &RoomId,
        local_path: &Path,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Storage that never has anything and accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStorage;

impl CloudStorage for NoopStorage {
    async fn load(&self, _room_id: &RoomId) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }

    async fn save(&self, _room_id: &RoomId, _local_path: &Path) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A directory of `<room id>.dat` files.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, room_id: &RoomId) -> PathBuf {
        self.root.join(format!("{room_id}.dat"))
    }
}

impl CloudStorage for FsStorage {
    async fn load(&self, room_id: &RoomId) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.blob_path(room_id)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, room_id: &RoomId, local_path: &Path) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::copy(local_path, self.blob_path(room_id)).await?;
        Ok(())
    }
}
