//! Media packetization and the collaborator seams.
//!
//! The playout core never parses containers or runs a codec. It
//! consumes already-prepared elementary media from a [`MediaSource`]
//! (the external codec pipeline) and emits correctly sized, correctly
//! timestamped transport frames into a [`FrameSink`] (the host channel
//! runtime). Two packetizers do the sizing work:
//!
//! | Stream | Module | Contract |
//! |--------|--------|----------|
//! | H.264  | [`h264`] | single NAL / FU-A under `max_payload_size` (RFC 6184) |
//! | H.265  | [`h265`] | planned |
//! | PCMA   | [`pcma`] | fixed `split_size` packets with carried residual |
//!
//! [`annexb`] provides the start-code scanner both video payloaders
//! build on.

pub mod annexb;
pub mod h264;
pub mod h265;
pub mod pcma;

use crate::clock::Rational;
use crate::error::Result;

/// Outbound media frame class understood by the [`FrameSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Destination for outbound media frames (the host channel runtime).
///
/// The core never retries a failed send — real-time media has no use
/// for replaying a missed deadline. An error is terminal for the
/// stream; the session orchestrator decides whether the session ends.
pub trait FrameSink {
    fn send(&mut self, kind: MediaKind, payload: &[u8], timestamp: u32, marker: bool)
    -> Result<()>;
}

/// One unit of pre-processed media from the codec pipeline, in arrival
/// order.
#[derive(Debug, Clone)]
pub enum SourcePacket {
    /// One H.264 access unit in Annex B form with its play duration
    /// in seconds.
    Video { data: Vec<u8>, duration: Rational },
    /// A chunk of already-encoded audio, `samples` samples long.
    Audio { data: Vec<u8>, samples: u32 },
}

/// Stream metadata, fetched once at session start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceInfo {
    /// Average video frame rate, when the source knows it.
    pub frame_rate: Option<Rational>,
    /// Decoder reorder delay in frames (B-frame depth).
    pub reorder_frames: u32,
}

/// The codec pipeline: demuxing, decoding, resampling and re-encoding
/// all happen behind this trait.
///
/// `read` returns `Ok(None)` on clean end of stream; any `Err` is
/// session-fatal.
pub trait MediaSource {
    fn info(&self) -> SourceInfo;
    fn read(&mut self) -> Result<Option<SourcePacket>>;

    /// Rewind for another play. Returns false when the source cannot
    /// restart, which ends looping playback cleanly.
    fn restart(&mut self) -> Result<bool> {
        Ok(false)
    }
}
