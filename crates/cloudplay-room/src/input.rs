//! Input multiplexing: many peers, one emulator input channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cloudplay_protocol::InputEvent;
use cloudplay_session::PeerSession;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Sending side of the room's input channel.
///
/// Offers never block. Closing drops the sender, which the core sees as
/// the end of input.
#[derive(Debug)]
pub(crate) struct InputSink {
    tx: Mutex<Option<mpsc::Sender<InputEvent>>>,
}

impl InputSink {
    pub(crate) fn new(tx: mpsc::Sender<InputEvent>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Queues `event` if there is room. Returns `false` if it was dropped.
    pub(crate) fn offer(&self, event: InputEvent) -> bool {
        let slot = self.slot();
        let Some(tx) = slot.as_ref() else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::trace!(peer = %event.conn_id, "input channel full, sample dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Drops the sender. Returns `true` only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        self.slot().take().is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<InputEvent>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forwards one peer's raw input into the room's input channel.
///
/// Runs until `cancel` fires or the peer's input source closes. Samples
/// arriving while the peer is marked disconnected are discarded.
/// Returns the number of samples accepted by the channel.
pub(crate) async fn poll_input(
    peer: Arc<PeerSession>,
    sink: Arc<InputSink>,
    cancel: CancellationToken,
) -> u64 {
    let mut source = peer.lock_input().await;
    let mut forwarded = 0u64;
    loop {
        let raw_state = tokio::select! {
            _ = cancel.cancelled() => break,
            sample = source.recv() => match sample {
                Some(sample) => sample,
                None => break,
            },
        };
        if !peer.is_connected() {
            continue;
        }
        let event = InputEvent {
            raw_state,
            player_index: peer.player_index(),
            conn_id: peer.id(),
        };
        if sink.offer(event) {
            forwarded += 1;
        }
    }
    tracing::debug!(peer = %peer.id(), forwarded, "input polling stopped");
    forwarded
}
