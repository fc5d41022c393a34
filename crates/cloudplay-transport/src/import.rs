//! Headless frame import over a Unix domain socket.
//!
//! When the emulator runs without producing video itself, a separate
//! process renders frames and streams them to the room over a local
//! socket. The listener accepts exactly one producer, reassembles the
//! record stream and republishes every decoded [`GameFrame`] on an mpsc
//! channel.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use cloudplay_protocol::{GameFrame, MsgPackCodec, RecordFraming, RecordReassembler, RoomId};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::TransportError;

/// Capacity of the channel between the listener and the video fan-out.
pub const FRAME_CHANNEL_CAPACITY: usize = 32;

/// The listener gives up after this many read errors in a row.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 64;

const READ_CHUNK_LEN: usize = 64 * 1024;

/// Deterministic socket path for a room's frame importer.
pub fn socket_path(room_id: &RoomId) -> PathBuf {
    PathBuf::from(format!("/tmp/cloudplay-retro-{room_id}.sock"))
}

/// A bound, not yet accepted, frame import socket.
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub struct FrameImportListener {
    listener: UnixListener,
    path: PathBuf,
    framing: RecordFraming,
}

impl FrameImportListener {
    /// Binds the socket for `room_id` at [`socket_path`].
    pub fn bind(room_id: &RoomId, framing: RecordFraming) -> Result<Self, TransportError> {
        Self::bind_at(socket_path(room_id), framing)
    }

    /// Binds at an explicit path. A stale socket file left behind by a
    /// previous process is removed first.
    pub fn bind_at(path: impl Into<PathBuf>, framing: RecordFraming) -> Result<Self, TransportError> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale import socket"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(TransportError::BindFailed(e)),
        }
        let listener = UnixListener::bind(&path).map_err(TransportError::BindFailed)?;
        tracing::info!(path = %path.display(), ?framing, "frame import socket listening");
        Ok(Self {
            listener,
            path,
            framing,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spawns the import task and returns the frame channel plus the task
    /// handle. The task resolves to the number of frames imported.
    pub fn spawn(self) -> (mpsc::Receiver<GameFrame>, JoinHandle<Result<u64, TransportError>>) {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let handle = tokio::spawn(
            async move {
                let result = self.run(tx).await;
                match &result {
                    Ok(imported) => tracing::info!(imported, "frame import finished"),
                    Err(e) => tracing::error!(error = %e, "frame import aborted"),
                }
                result
            }
            .in_current_span(),
        );
        (rx, handle)
    }

    /// Accepts a single producer and imports frames until the stream ends.
    ///
    /// Only one accept is ever attempted; the listener stays bound (and
    /// unserviced) until the import finishes.
    pub async fn run(self, frames: mpsc::Sender<GameFrame>) -> Result<u64, TransportError> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!("frame producer connected");
        import_frames(stream, self.framing, frames).await
    }
}

impl Drop for FrameImportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reads records from `reader` and forwards decoded frames to `frames`.
///
/// Returns the number of frames forwarded once the stream reaches EOF or
/// the receiving side is dropped.
///
/// # Errors
/// - `Protocol` on the first record that fails to frame or decode.
/// - `ReceiveFailed` after [`MAX_CONSECUTIVE_READ_ERRORS`] failed reads;
///   fewer failures are logged and the read is retried.
pub async fn import_frames<R>(
    mut reader: R,
    framing: RecordFraming,
    frames: mpsc::Sender<GameFrame>,
) -> Result<u64, TransportError>
where
    R: AsyncRead + Unpin,
{
    let codec = MsgPackCodec;
    let mut reassembler = RecordReassembler::new(framing);
    let mut chunk = vec![0u8; READ_CHUNK_LEN];
    let mut consecutive_errors = 0u32;
    let mut imported = 0u64;

    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::debug!(
                    imported,
                    residual = reassembler.residual(),
                    "frame producer closed the stream"
                );
                return Ok(imported);
            }
            Ok(n) => {
                consecutive_errors = 0;
                n
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                consecutive_errors += 1;
                tracing::error!(error = %e, consecutive_errors, "frame import read failed");
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    return Err(TransportError::ReceiveFailed {
                        attempts: consecutive_errors,
                        source: e,
                    });
                }
                continue;
            }
        };

        reassembler.extend(&chunk[..read]);
        while let Some(frame) = reassembler.next_value::<_, GameFrame>(&codec)? {
            if frames.send(frame).await.is_err() {
                tracing::debug!(imported, "frame consumer dropped, stopping import");
                return Ok(imported);
            }
            imported += 1;
        }
    }
}
