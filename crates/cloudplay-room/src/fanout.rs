//! Media fan-out: one emulator output stream to every peer.
//!
//! Each loop encodes an item once and delivers the encoded bytes to a
//! point-in-time snapshot of the room's peers. Disconnected peers are
//! skipped. What happens at a full peer queue depends on the
//! [`DeliveryPolicy`].

use std::sync::Arc;
use std::time::Duration;

use cloudplay_protocol::{AudioBlock, AudioFrame, GameFrame, VideoFrame};
use cloudplay_session::{PeerSession, SessionRegistry};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::config::DeliveryPolicy;
use crate::encoder::{AudioEncoder, VideoEncoder};

/// Per-peer queue selector, e.g. [`PeerSession::video_queue`].
type QueueOf<T> = for<'a> fn(&'a PeerSession) -> &'a mpsc::Sender<T>;

/// Counters for one fan-out loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    /// Items read from the emulator.
    pub received: u64,
    /// Item copies queued to peers.
    pub delivered: u64,
    /// Item copies lost to full or closed peer queues.
    pub dropped: u64,
}

/// Encodes frames and sends them to every connected peer until `frames`
/// closes or `done` fires.
pub async fn run_video_fanout(
    mut frames: mpsc::Receiver<GameFrame>,
    mut encoder: Box<dyn VideoEncoder>,
    sessions: Arc<SessionRegistry>,
    policy: DeliveryPolicy,
    done: CancellationToken,
) -> FanoutStats {
    let mut stats = FanoutStats::default();
    loop {
        let frame = tokio::select! {
            _ = done.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        stats.received += 1;
        let Some(data) = encoder.encode(&frame) else {
            continue;
        };
        let item = VideoFrame {
            data,
            timestamp: frame.timestamp,
        };
        let peers = sessions.snapshot().await;
        if !deliver(&peers, &item, PeerSession::video_queue, policy, &done, &mut stats).await {
            break;
        }
    }
    tracing::debug!(?stats, "video fan-out stopped");
    stats
}

/// Encodes PCM blocks and sends them to every connected peer until
/// `blocks` closes or `done` fires. Every frame carries `frame_duration`.
pub async fn run_audio_fanout(
    mut blocks: mpsc::Receiver<AudioBlock>,
    mut encoder: Box<dyn AudioEncoder>,
    frame_duration: Duration,
    sessions: Arc<SessionRegistry>,
    policy: DeliveryPolicy,
    done: CancellationToken,
) -> FanoutStats {
    let mut stats = FanoutStats::default();
    loop {
        let block = tokio::select! {
            _ = done.cancelled() => break,
            block = blocks.recv() => match block {
                Some(block) => block,
                None => break,
            },
        };
        stats.received += 1;
        let Some(data) = encoder.encode(&block) else {
            continue;
        };
        let item = AudioFrame {
            data,
            duration: frame_duration,
        };
        let peers = sessions.snapshot().await;
        if !deliver(&peers, &item, PeerSession::audio_queue, policy, &done, &mut stats).await {
            break;
        }
    }
    tracing::debug!(?stats, "audio fan-out stopped");
    stats
}

/// Offers `item` to every connected peer in order.
///
/// Returns `false` if `done` fired while blocked on a peer.
async fn deliver<T: Clone>(
    peers: &[Arc<PeerSession>],
    item: &T,
    queue_of: QueueOf<T>,
    policy: DeliveryPolicy,
    done: &CancellationToken,
    stats: &mut FanoutStats,
) -> bool {
    for peer in peers {
        if !peer.is_connected() {
            continue;
        }
        let queue = queue_of(peer);
        let sent = match policy {
            DeliveryPolicy::DropWhenFull => match queue.try_send(item.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(peer = %peer.id(), "peer queue full, item dropped");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            DeliveryPolicy::Block => tokio::select! {
                _ = done.cancelled() => return false,
                sent = queue.send(item.clone()) => sent.is_ok(),
            },
        };
        if sent {
            stats.delivered += 1;
        } else {
            stats.dropped += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{PcmAudioEncoder, RawVideoEncoder};
    use cloudplay_protocol::{PeerId, RoomId};
    use cloudplay_session::{PeerConfig, PeerEndpoint};

    fn small_peer(id: u64, video_queue: usize) -> (Arc<PeerSession>, PeerEndpoint) {
        let config = PeerConfig {
            video_queue,
            ..PeerConfig::default()
        };
        PeerSession::with_id(PeerId(id), &config)
    }

    async fn registry_with(peers: &[&Arc<PeerSession>]) -> Arc<SessionRegistry> {
        let registry = Arc::new(SessionRegistry::new(RoomId::new("fanout"), CancellationToken::new()));
        for peer in peers {
            registry.add(Arc::clone(peer)).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_video_skips_disconnected_and_continues() {
        let (a, mut a_end) = small_peer(1, 8);
        let (b, mut b_end) = small_peer(2, 8);
        let (c, mut c_end) = small_peer(3, 8);
        b.set_connected(false);
        let registry = registry_with(&[&a, &b, &c]).await;

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_video_fanout(
            rx,
            Box::new(RawVideoEncoder),
            registry,
            DeliveryPolicy::DropWhenFull,
            CancellationToken::new(),
        ));
        tx.send(GameFrame::new(vec![5; 4], 42)).await.unwrap();
        drop(tx);
        let stats = task.await.unwrap();

        assert_eq!(a_end.video.recv().await.unwrap().timestamp, 42);
        assert_eq!(c_end.video.recv().await.unwrap().timestamp, 42);
        assert!(b_end.video.try_recv().is_err());
        assert_eq!(stats, FanoutStats { received: 1, delivered: 2, dropped: 0 });
    }

    #[tokio::test]
    async fn test_drop_when_full_does_not_stall_other_peers() {
        let (slow, _slow_end) = small_peer(1, 1);
        let (fast, mut fast_end) = small_peer(2, 8);
        let registry = registry_with(&[&slow, &fast]).await;

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_video_fanout(
            rx,
            Box::new(RawVideoEncoder),
            registry,
            DeliveryPolicy::DropWhenFull,
            CancellationToken::new(),
        ));
        for ts in 0..3 {
            tx.send(GameFrame::new(vec![0], ts)).await.unwrap();
        }
        drop(tx);
        let stats = task.await.unwrap();

        for ts in 0..3 {
            assert_eq!(fast_end.video.recv().await.unwrap().timestamp, ts);
        }
        assert_eq!(stats.delivered, 4);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn test_block_policy_stops_on_done() {
        let (slow, mut slow_end) = small_peer(1, 1);
        let registry = registry_with(&[&slow]).await;
        let done = CancellationToken::new();

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_video_fanout(
            rx,
            Box::new(RawVideoEncoder),
            registry,
            DeliveryPolicy::Block,
            done.clone(),
        ));
        tx.send(GameFrame::new(vec![0], 0)).await.unwrap();
        tx.send(GameFrame::new(vec![0], 1)).await.unwrap();
        tx.send(GameFrame::new(vec![0], 2)).await.unwrap();
        assert_eq!(slow_end.video.recv().await.unwrap().timestamp, 0);
        done.cancel();

        let stats = task.await.unwrap();
        assert!(stats.delivered >= 1);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_audio_frames_carry_configured_duration() {
        let (a, mut a_end) = small_peer(1, 8);
        let registry = registry_with(&[&a]).await;

        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_audio_fanout(
            rx,
            Box::new(PcmAudioEncoder),
            Duration::from_millis(10),
            registry,
            DeliveryPolicy::DropWhenFull,
            CancellationToken::new(),
        ));
        tx.send(AudioBlock(vec![1, 2])).await.unwrap();
        tx.send(AudioBlock::default()).await.unwrap();
        drop(tx);
        let stats = task.await.unwrap();

        let frame = a_end.audio.recv().await.unwrap();
        assert_eq!(frame.duration, Duration::from_millis(10));
        assert_eq!(&frame.data[..], &[1, 0, 2, 0]);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.delivered, 1);
    }
}
