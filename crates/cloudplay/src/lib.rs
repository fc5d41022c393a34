//! # Cloudplay
//!
//! Room session core for cloud-streamed emulators.
//!
//! A room binds one running emulator core to a changing set of remote
//! peers: it fans the core's video and audio out to every peer, merges
//! the peers' controller input back into the core, and keeps the game's
//! save in step with durable storage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cloudplay::prelude::*;
//!
//! // Implement EmulatorBackend for your core, then:
//! // cloudplay::init_tracing();
//! // let worker = WorkerBuilder::new()
//! //     .config_file("worker.toml")?
//! //     .build(MyBackend::new(), NoopStorage);
//! // let room = worker.open_room(None, game).await;
//! // worker.join(peer, room.id()).await?;
//! ```

mod config;
mod error;
mod telemetry;
mod worker;

pub use config::{load_config, parse_config};
pub use error::CloudplayError;
pub use telemetry::init_tracing;
pub use worker::{Worker, WorkerBuilder};

pub use cloudplay_protocol as protocol;
pub use cloudplay_room as room;
pub use cloudplay_session as session;
pub use cloudplay_transport as transport;

pub mod prelude {
    pub use crate::{CloudplayError, Worker, WorkerBuilder, init_tracing, load_config};
    pub use cloudplay_protocol::{
        AudioFrame, GameFrame, InputEvent, PeerId, RecordFraming, RoomId, VideoFrame,
    };
    pub use cloudplay_room::{
        CloudStorage, Director, DirectorError, EmulatorBackend, FsStorage, GameMeta, GameMetadata,
        NoopStorage, Room, RoomError, RoomManager, RoomState, SpawnRequest, SpawnedCore,
        WorkerConfig,
    };
    pub use cloudplay_session::{PeerConfig, PeerEndpoint, PeerSession};
}
