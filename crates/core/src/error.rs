//! Error types for the playout engine.

use crate::media::MediaKind;

/// Errors that can occur in the playout core.
///
/// Fatality is decided by the [`session`](crate::session) orchestrator,
/// not by the component that produced the error:
///
/// - **Stream-fatal**: [`ScratchOverflow`](Self::ScratchOverflow) stops
///   video processing for the stream; audio continues.
/// - **Session-fatal**: [`Sink`](Self::Sink), [`Source`](Self::Source),
///   and [`Io`](Self::Io) from a media source or sink end the session.
/// - The RTCP side channel never surfaces errors here — a failed sender
///   report is logged and the stream continues without a sync anchor.
#[derive(Debug, thiserror::Error)]
pub enum PlayoutError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A NAL unit plus framing does not fit the payloader's fixed
    /// scratch buffer. Unrecoverable for the current access unit.
    #[error("NAL unit needs {required} scratch bytes, capacity is {capacity}")]
    ScratchOverflow { required: usize, capacity: usize },

    /// `max_payload_size` outside the range the scratch buffer supports.
    #[error("invalid max payload size: {0}")]
    InvalidPayloadSize(usize),

    /// Audio `split_size` the repacketizer cannot make progress with.
    #[error("invalid audio split size: {0}")]
    InvalidSplitSize(usize),

    /// The frame sink refused an outbound frame. Never retried.
    #[error("frame sink failed for {kind:?} frame: {reason}")]
    Sink { kind: MediaKind, reason: String },

    /// The codec pipeline failed other than by clean end of stream.
    #[error("media source error: {0}")]
    Source(String),
}

/// Convenience alias for `Result<T, PlayoutError>`.
pub type Result<T> = std::result::Result<T, PlayoutError>;
