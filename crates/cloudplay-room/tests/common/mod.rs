//! Mock emulator backend and in-memory storage shared by the room tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudplay_protocol::{AudioBlock, GameFrame, InputEvent, RoomId};
use cloudplay_room::{
    CloudStorage, CoreConfig, Director, DirectorError, EmulatorBackend, GameMeta, GameMetadata,
    Rotation, SaveLocation, SpawnRequest, SpawnedCore, StorageError, WorkerConfig,
};
use tokio::sync::mpsc;

/// Fails the test if `future` takes longer than five seconds.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

pub fn config(storage: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.emulator.storage = storage.to_path_buf();
    config.emulator.cores.insert(
        "nes".to_owned(),
        CoreConfig {
            lib: "nestopia_libretro.so".to_owned(),
            roms: vec!["nes".to_owned()],
            ..CoreConfig::default()
        },
    );
    config
}

pub fn mario() -> GameMetadata {
    GameMetadata::new("Super Mario Bros", "nes", "mario.nes")
}

// =========================================================================
// Call log
// =========================================================================

/// Ordered record of every call into the mock core.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Polls until `call` shows up.
    pub async fn wait_for(&self, call: &str) {
        within(async {
            while self.position(call).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }
}

// =========================================================================
// Mock core
// =========================================================================

/// The emulator side of a spawned mock core: what a real core would
/// write to and read from.
pub struct CoreHarness {
    pub core_name: String,
    pub with_video: bool,
    pub save: SaveLocation,
    pub video: Option<mpsc::Sender<GameFrame>>,
    pub audio: mpsc::Sender<AudioBlock>,
    pub input: mpsc::Receiver<InputEvent>,
}

pub struct MockDirector {
    log: CallLog,
    meta: GameMeta,
    save_path: PathBuf,
    fail_metadata: bool,
    fail_save: bool,
    has_multitap: bool,
}

impl Director for MockDirector {
    fn load_metadata(&self, path: &Path) -> Result<GameMeta, DirectorError> {
        self.log.push(format!("load_metadata {}", path.display()));
        if self.fail_metadata {
            return Err(DirectorError::Metadata("bad rom header".to_owned()));
        }
        Ok(self.meta)
    }

    fn set_viewport(&self, width: u32, height: u32) {
        self.log.push(format!("set_viewport {width}x{height}"));
    }

    fn start(&self) {
        self.log.push("start");
    }

    fn save_game(&self) -> Result<(), DirectorError> {
        self.log.push("save_game");
        if self.fail_save {
            return Err(DirectorError::Save("disk full".to_owned()));
        }
        if let Some(parent) = self.save_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.save_path, SAVED_STATE)?;
        Ok(())
    }

    fn load_game(&self) -> Result<(), DirectorError> {
        self.log.push("load_game");
        Ok(())
    }

    fn toggle_multitap(&self) -> Result<(), DirectorError> {
        self.log.push("toggle_multitap");
        if self.has_multitap {
            Ok(())
        } else {
            Err(DirectorError::MultitapUnsupported)
        }
    }

    fn close(&self) {
        self.log.push("close");
    }

    fn local_save_path(&self) -> PathBuf {
        self.save_path.clone()
    }
}

/// What the mock core writes when asked to save.
pub const SAVED_STATE: &[u8] = b"state";

pub struct MockBackend {
    pub log: CallLog,
    pub meta: GameMeta,
    pub fail_metadata: bool,
    pub fail_save: bool,
    spawn_gate: Option<Mutex<std::sync::mpsc::Receiver<()>>>,
    harnesses: mpsc::UnboundedSender<CoreHarness>,
}

impl MockBackend {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CoreHarness>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Self {
            log: CallLog::default(),
            meta: GameMeta {
                base_width: 256,
                base_height: 240,
                rotation: Rotation(0),
                audio_sample_rate: 48_000,
            },
            fail_metadata: false,
            fail_save: false,
            spawn_gate: None,
            harnesses: tx,
        };
        (backend, rx)
    }

    /// Makes `spawn` block after logging until the returned sender sends
    /// or is dropped.
    pub fn gate_spawn(&mut self) -> std::sync::mpsc::Sender<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.spawn_gate = Some(Mutex::new(rx));
        tx
    }
}

impl EmulatorBackend for MockBackend {
    type Director = MockDirector;

    fn spawn(&self, request: SpawnRequest) -> Result<SpawnedCore<MockDirector>, DirectorError> {
        self.log.push(format!("spawn {}", request.core_name));
        if let Some(gate) = &self.spawn_gate {
            let _ = gate.lock().unwrap().recv();
        }
        let (video_tx, video_rx) = mpsc::channel(8);
        let (audio_tx, audio_rx) = mpsc::channel(8);
        let (video_tx, video_rx) = if request.with_video {
            (Some(video_tx), Some(video_rx))
        } else {
            (None, None)
        };

        let director = MockDirector {
            log: self.log.clone(),
            meta: self.meta,
            save_path: request.save.save_path(),
            fail_metadata: self.fail_metadata,
            fail_save: self.fail_save,
            has_multitap: request.core.has_multitap,
        };
        let _ = self.harnesses.send(CoreHarness {
            core_name: request.core_name,
            with_video: request.with_video,
            save: request.save,
            video: video_tx,
            audio: audio_tx,
            input: request.input,
        });
        Ok(SpawnedCore {
            director,
            video: video_rx,
            audio: audio_rx,
        })
    }
}

// =========================================================================
// In-memory storage
// =========================================================================

#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<RoomId, Vec<u8>>>,
    saves: Mutex<Vec<RoomId>>,
    pub fail_save: AtomicBool,
}

impl MemoryStorage {
    pub fn with_blob(room_id: &RoomId, blob: &[u8]) -> Self {
        let storage = Self::default();
        storage.blobs.lock().unwrap().insert(room_id.clone(), blob.to_vec());
        storage
    }

    pub fn blob(&self, room_id: &RoomId) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(room_id).cloned()
    }

    /// Room ids pushed so far, in order.
    pub fn saves(&self) -> Vec<RoomId> {
        self.saves.lock().unwrap().clone()
    }
}

impl CloudStorage for MemoryStorage {
    async fn load(&self, room_id: &RoomId) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blob(room_id))
    }

    async fn save(&self, room_id: &RoomId, local_path: &Path) -> Result<(), StorageError> {
        if self.fail_save.load(Ordering::Relaxed) {
            return Err(StorageError::Backend("bucket unavailable".to_owned()));
        }
        let blob = tokio::fs::read(local_path).await?;
        self.blobs.lock().unwrap().insert(room_id.clone(), blob);
        self.saves.lock().unwrap().push(room_id.clone());
        Ok(())
    }
}
