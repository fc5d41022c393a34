//! Worker configuration and the room state machine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cloudplay_protocol::RecordFraming;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

/// Everything a worker needs to open rooms.
///
/// Every section has defaults, so an empty document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub emulator: EmulatorConfig,
    pub encoder: EncoderConfig,
    pub room: RoomSettings,
}

/// `[emulator]`: cores, save storage and output sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Directory holding local save files (`<room id>.dat`).
    pub storage: PathBuf,
    /// Known cores by name.
    pub cores: BTreeMap<String, CoreConfig>,
    pub aspect_ratio: AspectRatioConfig,
    /// Integer output scale; values of 0 and 1 leave the size alone.
    pub scale: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            storage: std::env::temp_dir().join("cloudplay"),
            cores: BTreeMap::new(),
            aspect_ratio: AspectRatioConfig::default(),
            scale: 1,
        }
    }
}

impl EmulatorConfig {
    /// Picks the core able to run `game`.
    ///
    /// Cores listing the game's type win over cores matching only its file
    /// extension. Among equal candidates, a core named like the game's
    /// top-level folder is preferred; otherwise the first by name.
    pub fn core_for(&self, game: &GameMetadata) -> Option<(&str, &CoreConfig)> {
        let folder = game.folder();
        let pick = |matches: &dyn Fn(&CoreConfig) -> bool| {
            let mut first = None;
            for (name, core) in self.cores.iter().filter(|(_, core)| matches(core)) {
                if folder == Some(name.as_str()) {
                    return Some((name.as_str(), core));
                }
                first.get_or_insert((name.as_str(), core));
            }
            first
        };

        pick(&|core: &CoreConfig| !game.kind.is_empty() && core.supports(&game.kind)).or_else(|| {
            let extension = game.extension()?;
            pick(&|core: &CoreConfig| core.supports(extension))
        })
    }
}

/// `[emulator.cores.<name>]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Path or name of the core library.
    pub lib: String,
    /// Optional core-specific options file.
    pub config: Option<String>,
    /// ROM types / extensions the core accepts.
    pub roms: Vec<String>,
    pub has_multitap: bool,
}

impl CoreConfig {
    fn supports(&self, rom: &str) -> bool {
        self.roms.iter().any(|r| r.eq_ignore_ascii_case(rom))
    }
}

/// `[emulator.aspect_ratio]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AspectRatioConfig {
    /// Fit the game's own aspect ratio into `width` x `height`.
    pub keep: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for AspectRatioConfig {
    fn default() -> Self {
        Self {
            keep: false,
            width: 320,
            height: 240,
        }
    }
}

/// `[encoder]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub audio: AudioConfig,
    pub video: VideoConfig,
    /// Run the core headless and take video from the frame import socket.
    pub without_game: bool,
    pub import_framing: RecordFraming,
    pub delivery: DeliveryPolicy,
}

/// `[encoder.audio]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Duration carried by every outgoing audio frame, in milliseconds.
    pub frame_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { frame_ms: 20 }
    }
}

/// `[encoder.video]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub codec: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: "h264".to_owned(),
        }
    }
}

/// What the fan-out does when a peer's queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// The peer loses the item; other peers are not held up.
    #[default]
    DropWhenFull,
    /// Wait for the peer to make room before moving to the next one.
    Block,
}

/// `[room]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Capacity of the input channel feeding the emulator.
    pub input_capacity: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            input_capacity: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// GameMetadata
// ---------------------------------------------------------------------------

/// The game a room is opened for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameMetadata {
    pub name: String,
    /// ROM type, e.g. `"nes"`. Empty means "go by extension".
    #[serde(rename = "type")]
    pub kind: String,
    /// Library root the path is relative to.
    pub base: PathBuf,
    /// Path of the ROM inside the library.
    pub path: String,
}

impl GameMetadata {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            base: PathBuf::new(),
            path: path.into(),
        }
    }

    /// Absolute location of the ROM.
    pub fn full_path(&self) -> PathBuf {
        self.base.join(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.path).extension()?.to_str()
    }

    /// Top-level folder of the ROM path, when it has one.
    fn folder(&self) -> Option<&str> {
        let path = self.path.trim_start_matches('/');
        let (folder, _) = path.split_once('/')?;
        (!folder.is_empty()).then_some(folder)
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Initializing → Running → Closing → Closed
///      └──────────────────────┘
/// ```
///
/// - **Initializing**: the room exists and accepts peers while its driver
///   restores saves and brings the core up.
/// - **Running**: the core is running and media flows.
/// - **Closing**: close was requested; the driver is saving and stopping
///   the core.
/// - **Closed**: everything is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomState {
    Initializing,
    Running,
    Closing,
    Closed,
}

impl RoomState {
    /// Returns `true` while peers may still join.
    pub fn accepts_peers(&self) -> bool {
        matches!(self, Self::Initializing | Self::Running)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The regular successor of this state.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Initializing => Some(Self::Running),
            Self::Running => Some(Self::Closing),
            Self::Closing => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if moving to `target` is valid. Besides the regular
    /// successor, a room still initializing may go straight to Closing.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (self == Self::Initializing && target == Self::Closing)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Running => write!(f, "Running"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
