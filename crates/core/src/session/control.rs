use std::time::Duration;

use crate::error::Result;

/// Out-of-band event from the host call-control runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The far end hung up; the session must stop sending.
    Hangup,
    /// A key press arrived (DTMF or console, host's choice).
    Key(char),
}

/// Control seam polled between packets.
///
/// `poll` waits at most `timeout` for an event; `Ok(None)` means
/// nothing happened. The orchestrator polls with a zero timeout while
/// streaming and a longer one while paused, so implementations must
/// tolerate both.
pub trait ControlSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<ControlEvent>>;
}

/// Control source that never reports anything. For unattended playback.
#[derive(Debug, Default)]
pub struct NullControl;

impl ControlSource for NullControl {
    fn poll(&mut self, _timeout: Duration) -> Result<Option<ControlEvent>> {
        Ok(None)
    }
}
