//! Room lifecycle management for Cloudplay.
//!
//! A room runs one emulator core, fans its video and audio out to every
//! connected peer and merges the peers' input back into the core.
//!
//! # Key types
//!
//! - [`Room`]: handle to one room; peers, save/load, close
//! - [`RoomManager`]: opens/closes rooms, routes peers
//! - [`EmulatorBackend`] / [`Director`]: the emulator core seam
//! - [`CloudStorage`]: where saves outlive the worker
//! - [`RoomState`]: lifecycle state machine
//! - [`WorkerConfig`]: cores, sizing, encoder and room settings

mod config;
mod director;
mod encoder;
mod error;
pub mod fanout;
mod input;
mod manager;
mod room;
mod save;
mod storage;
pub mod viewport;

pub use config::{
    AspectRatioConfig, AudioConfig, CoreConfig, DeliveryPolicy, EmulatorConfig, EncoderConfig,
    GameMetadata, RoomSettings, RoomState, VideoConfig, WorkerConfig,
};
pub use director::{
    Director, EmulatorBackend, GameMeta, Rotation, SaveLocation, SpawnRequest, SpawnedCore,
};
pub use encoder::{AudioEncoder, PcmAudioEncoder, RawVideoEncoder, VideoEncoder};
pub use error::{DirectorError, RoomError, StorageError};
pub use fanout::FanoutStats;
pub use manager::RoomManager;
pub use room::{Room, peer_in_room};
pub use save::SaveCoordinator;
pub use storage::{CloudStorage, FsStorage, NoopStorage};
pub use viewport::{Viewport, output_viewport, size_to_fit};
