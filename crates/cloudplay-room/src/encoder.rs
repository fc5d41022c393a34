//! Per-room media encoders.
//!
//! The fan-out loops encode every item once and hand the same bytes to
//! every peer. Real codecs are supplied by the emulator backend; the
//! passthrough encoders here are the defaults.

use bytes::{BufMut, Bytes, BytesMut};
use cloudplay_protocol::{AudioBlock, GameFrame};

/// Encodes raw frames for delivery.
///
/// Returning `None` means "nothing to send for this frame" (an encoder
/// that buffers, or one that failed on this frame).
pub trait VideoEncoder: Send + 'static {
    fn encode(&mut self, frame: &GameFrame) -> Option<Bytes>;
}

/// Encodes raw PCM blocks for delivery.
pub trait AudioEncoder: Send + 'static {
    fn encode(&mut self, block: &AudioBlock) -> Option<Bytes>;
}

/// Sends the frame's raw image as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawVideoEncoder;

impl VideoEncoder for RawVideoEncoder {
    fn encode(&mut self, frame: &GameFrame) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(&frame.data))
    }
}

/// Sends samples as interleaved little-endian 16-bit PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmAudioEncoder;

impl AudioEncoder for PcmAudioEncoder {
    fn encode(&mut self, block: &AudioBlock) -> Option<Bytes> {
        let samples = block.samples();
        if samples.is_empty() {
            return None;
        }
        let mut out = BytesMut::with_capacity(samples.len() * 2);
        for &sample in samples {
            out.put_i16_le(sample);
        }
        Some(out.freeze())
    }
}
