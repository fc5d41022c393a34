//! Peer session handles.
//!
//! A peer is one remote viewer/player connection. The transport that
//! actually talks to the client (WebRTC, a test harness, ...) keeps the
//! [`PeerEndpoint`]; rooms only ever see the shared [`PeerSession`] half,
//! which carries:
//! - WHO the peer is (`PeerId`)
//! - WHETHER it is currently connected
//! - WHICH player slot it drives
//! - WHERE its media goes (bounded video and audio queues)
//! - WHERE its raw input comes from
//! - WHICH room it belongs to, if any

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cloudplay_protocol::{AudioFrame, PeerId, RoomId, VideoFrame};
use tokio::sync::{MutexGuard, mpsc};

use crate::SessionError;

/// Counter for generating unique peer IDs.
static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// PeerConfig
// ---------------------------------------------------------------------------

/// Queue capacities for a peer's channels.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Encoded video frames waiting to be sent to the client.
    pub video_queue: usize,
    /// Encoded audio frames waiting to be sent to the client.
    pub audio_queue: usize,
    /// Raw input samples received from the client, not yet polled.
    pub input_queue: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            video_queue: 32,
            audio_queue: 64,
            input_queue: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

/// The room-facing half of a peer connection.
///
/// Shared as `Arc<PeerSession>` between the registry, the fan-out loops
/// and the peer's input task.
#[derive(Debug)]
pub struct PeerSession {
    id: PeerId,
    connected: AtomicBool,
    player_index: AtomicUsize,
    room: Mutex<Option<RoomId>>,
    video: mpsc::Sender<VideoFrame>,
    audio: mpsc::Sender<AudioFrame>,
    input: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
}

/// The transport-facing half of a peer connection.
#[derive(Debug)]
pub struct PeerEndpoint {
    pub id: PeerId,
    /// Frames to send to the client.
    pub video: mpsc::Receiver<VideoFrame>,
    /// Audio to send to the client.
    pub audio: mpsc::Receiver<AudioFrame>,
    /// Where the transport pushes the client's raw input.
    pub input: mpsc::Sender<Vec<u8>>,
}

impl PeerSession {
    /// Creates a connected peer with a fresh id.
    pub fn new(config: &PeerConfig) -> (Arc<Self>, PeerEndpoint) {
        let id = PeerId(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, config)
    }

    /// Creates a connected peer with a caller-chosen id.
    pub fn with_id(id: PeerId, config: &PeerConfig) -> (Arc<Self>, PeerEndpoint) {
        let (video_tx, video_rx) = mpsc::channel(config.video_queue.max(1));
        let (audio_tx, audio_rx) = mpsc::channel(config.audio_queue.max(1));
        let (input_tx, input_rx) = mpsc::channel(config.input_queue.max(1));

        let session = Arc::new(Self {
            id,
            connected: AtomicBool::new(true),
            player_index: AtomicUsize::new(0),
            room: Mutex::new(None),
            video: video_tx,
            audio: audio_tx,
            input: tokio::sync::Mutex::new(input_rx),
        });
        let endpoint = PeerEndpoint {
            id,
            video: video_rx,
            audio: audio_rx,
            input: input_tx,
        };
        (session, endpoint)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Updated by the transport as the connection comes and goes.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn player_index(&self) -> usize {
        self.player_index.load(Ordering::Acquire)
    }

    pub fn set_player_index(&self, index: usize) {
        self.player_index.store(index, Ordering::Release);
    }

    /// The room this peer is attached to, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        self.room_slot().clone()
    }

    pub fn video_queue(&self) -> &mpsc::Sender<VideoFrame> {
        &self.video
    }

    pub fn audio_queue(&self) -> &mpsc::Sender<AudioFrame> {
        &self.audio
    }

    /// Locks the peer's raw input source.
    ///
    /// Held for the lifetime of the peer's input task; a second task
    /// waits until the first one lets go.
    pub async fn lock_input(&self) -> MutexGuard<'_, mpsc::Receiver<Vec<u8>>> {
        self.input.lock().await
    }

    /// Records `room` as this peer's room.
    ///
    /// Attaching again to the same room is allowed; any other room is not.
    pub(crate) fn attach(&self, room: &RoomId) -> Result<(), SessionError> {
        let mut slot = self.room_slot();
        match slot.as_ref() {
            Some(current) if current != room => Err(SessionError::AttachedElsewhere {
                peer: self.id,
                current: current.clone(),
                requested: room.clone(),
            }),
            _ => {
                *slot = Some(room.clone());
                Ok(())
            }
        }
    }

    /// Clears the room association if it still points at `room`.
    pub(crate) fn detach(&self, room: &RoomId) {
        let mut slot = self.room_slot();
        if slot.as_ref() == Some(room) {
            *slot = None;
        }
    }

    fn room_slot(&self) -> std::sync::MutexGuard<'_, Option<RoomId>> {
        // The slot holds plain data; a panic elsewhere cannot leave it torn.
        self.room.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
