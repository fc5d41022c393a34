//! The seam between a room and an emulator core.
//!
//! A [`Director`] drives one running core. Its methods are synchronous
//! and may block for a long time (`start` runs the core's main loop), so
//! the room only ever calls them from blocking threads. An
//! [`EmulatorBackend`] knows how to spawn directors and which encoders go
//! with them.

use std::path::{Path, PathBuf};

use cloudplay_protocol::{AudioBlock, GameFrame, InputEvent, RoomId};
use tokio::sync::mpsc;

use crate::config::{AudioConfig, CoreConfig, VideoConfig};
use crate::encoder::{AudioEncoder, PcmAudioEncoder, RawVideoEncoder, VideoEncoder};
use crate::DirectorError;

// ---------------------------------------------------------------------------
// Game metadata
// ---------------------------------------------------------------------------

/// Screen rotation in quarter turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rotation(pub u8);

impl Rotation {
    /// Returns `true` when the picture is on its side (90 or 270 degrees).
    pub fn is_sideways(self) -> bool {
        self.0 % 2 == 1
    }
}

/// What the core reports about a loaded game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMeta {
    pub base_width: u32,
    pub base_height: u32,
    pub rotation: Rotation,
    pub audio_sample_rate: u32,
}

// ---------------------------------------------------------------------------
// Director
// ---------------------------------------------------------------------------

/// Control surface of a running emulator core.
pub trait Director: Send + Sync + 'static {
    /// Loads the game at `path` and reports its geometry.
    fn load_metadata(&self, path: &Path) -> Result<GameMeta, DirectorError>;

    fn set_viewport(&self, width: u32, height: u32);

    /// Runs the core's main loop. Returns once the core is closed.
    fn start(&self);

    /// Writes the current state to [`local_save_path`](Self::local_save_path).
    fn save_game(&self) -> Result<(), DirectorError>;

    /// Restores the state from [`local_save_path`](Self::local_save_path).
    fn load_game(&self) -> Result<(), DirectorError>;

    fn toggle_multitap(&self) -> Result<(), DirectorError>;

    /// Stops the core. Safe to call once `start` has returned or was never
    /// called.
    fn close(&self);

    fn local_save_path(&self) -> PathBuf;
}

// ---------------------------------------------------------------------------
// EmulatorBackend
// ---------------------------------------------------------------------------

/// Where a core keeps its save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveLocation {
    /// Save directory (`emulator.storage`).
    pub root: PathBuf,
    /// File stem of the main save, the room id.
    pub main_save: String,
}

impl SaveLocation {
    pub fn new(root: impl Into<PathBuf>, room_id: &RoomId) -> Self {
        Self {
            root: root.into(),
            main_save: room_id.to_string(),
        }
    }

    /// `<root>/<main_save>.dat`
    pub fn save_path(&self) -> PathBuf {
        self.root.join(format!("{}.dat", self.main_save))
    }
}

/// Everything a backend needs to bring up a core for a room.
#[derive(Debug)]
pub struct SpawnRequest {
    pub room_id: RoomId,
    pub core_name: String,
    pub core: CoreConfig,
    /// `false` in headless mode; video then comes from the import socket.
    pub with_video: bool,
    /// The room's input channel. The core owns the receiving end.
    pub input: mpsc::Receiver<InputEvent>,
    pub save: SaveLocation,
}

/// A freshly spawned core and its output channels.
#[derive(Debug)]
pub struct SpawnedCore<D> {
    pub director: D,
    /// `None` when spawned without video.
    pub video: Option<mpsc::Receiver<GameFrame>>,
    pub audio: mpsc::Receiver<AudioBlock>,
}

/// Factory for emulator cores.
pub trait EmulatorBackend: Send + Sync + 'static {
    type Director: Director;

    /// Spawns a core. May block.
    fn spawn(&self, request: SpawnRequest) -> Result<SpawnedCore<Self::Director>, DirectorError>;

    fn video_encoder(&self, _width: u32, _height: u32, _config: &VideoConfig) -> Box<dyn VideoEncoder> {
        Box::new(RawVideoEncoder)
    }

    fn audio_encoder(&self, _sample_rate: u32, _config: &AudioConfig) -> Box<dyn AudioEncoder> {
        Box::new(PcmAudioEncoder)
    }
}
