pub mod clock;
pub mod error;
pub mod media;
pub mod rtcp;
pub mod session;
pub mod transport;

pub use error::{PlayoutError, Result};
pub use media::{FrameSink, MediaKind, MediaSource, SourceInfo, SourcePacket};
pub use session::{
    ControlEvent, ControlSource, NullControl, PlaybackOutcome, PlaybackStats, Player,
    SessionConfig, StopReason, SyncConfig,
};
