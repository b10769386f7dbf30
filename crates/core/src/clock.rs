//! Per-stream timestamp derivation and real-time pacing.
//!
//! The engine is fully synchronous: the only scheduling mechanism is an
//! in-line blocking sleep before each emission ([`PlayoutClock::pace`]).
//! There is no lookahead buffering — packet *n+1* is gated on packet
//! *n*'s pacing sleep completing.
//!
//! Three pieces of state cooperate per session:
//!
//! - [`PlayoutClock`]: wall-clock start plus accumulated pause time.
//! - [`StreamTiming`]: decode timestamps (`dts`) in microseconds,
//!   advanced by each packet's duration.
//! - [`RtpTiming`]: the outbound timestamp in the stream's wire clock
//!   rate (90 kHz video, 8 kHz PCMA), anchored at a wall-clock-derived
//!   base so consecutive plays within one call stay monotonic.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// RTP clock rate for H.264 video (RFC 6184 §8.1).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// RTP clock rate for PCMA audio (RFC 3551 §4.5.14).
pub const AUDIO_CLOCK_RATE: u32 = 8_000;

pub(crate) const MICROS_PER_SEC: i64 = 1_000_000;

/// Exact rational, used for frame rates and packet durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Value of `num/den` seconds in microseconds.
    pub fn to_micros(self) -> i64 {
        rescale(self.num, MICROS_PER_SEC, self.den)
    }
}

/// Rescale `a * b / c` in 128-bit arithmetic, rounding half away from zero.
pub fn rescale(a: i64, b: i64, c: i64) -> i64 {
    let p = a as i128 * b as i128;
    let half = c as i128 / 2;
    ((p + if p >= 0 { half } else { -half }) / c as i128) as i64
}

/// Decode timestamp of the first video packet, in microseconds.
///
/// A decoder reorder delay (B-frame depth) pushes the first `dts`
/// negative by that many frame intervals; without a known frame rate
/// the stream starts at zero.
pub fn initial_video_dts_us(frame_rate: Option<Rational>, reorder_frames: u32) -> i64 {
    match frame_rate {
        Some(rate) if rate.num > 0 => {
            -rescale(reorder_frames as i64 * MICROS_PER_SEC, rate.den, rate.num)
        }
        _ => 0,
    }
}

/// Wall-clock pacing for one play.
///
/// `elapsed_us` is session time: wall time since start minus the
/// accumulated pause duration, so pacing resumes after a pause without
/// a timestamp discontinuity.
#[derive(Debug)]
pub struct PlayoutClock {
    started: Instant,
    paused: Duration,
}

impl PlayoutClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            paused: Duration::ZERO,
        }
    }

    /// Session time elapsed, in microseconds.
    pub fn elapsed_us(&self) -> i64 {
        self.started.elapsed().as_micros() as i64 - self.paused.as_micros() as i64
    }

    /// Record a completed pause interval.
    pub fn add_pause(&mut self, interval: Duration) {
        self.paused += interval;
    }

    /// Total time spent paused so far.
    pub fn paused(&self) -> Duration {
        self.paused
    }

    /// How long [`pace`](Self::pace) would sleep for `target_us`.
    /// Clamped at zero when the target is already past.
    pub fn pending_wait(&self, target_us: i64) -> Duration {
        let wait = target_us - self.elapsed_us();
        if wait > 0 {
            Duration::from_micros(wait as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Block until `target_us` of session time has elapsed.
    pub fn pace(&self, target_us: i64) {
        let wait = self.pending_wait(target_us);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

/// Decode-time state for one stream.
///
/// `dts` is monotonically non-decreasing once the first timestamp has
/// been seen, provided packet durations are non-negative.
#[derive(Debug, Default)]
pub struct StreamTiming {
    saw_first_ts: bool,
    dts_us: i64,
    next_dts_us: i64,
}

impl StreamTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode timestamp for the current packet; advances the predicted
    /// next `dts` by the packet's duration.
    pub fn advance(&mut self, first_dts_us: i64, duration_us: i64) -> i64 {
        if !self.saw_first_ts {
            self.dts_us = first_dts_us;
            self.next_dts_us = first_dts_us;
            self.saw_first_ts = true;
        } else {
            self.dts_us = self.next_dts_us;
        }
        self.next_dts_us += duration_us;
        self.dts_us
    }

    pub fn dts_us(&self) -> i64 {
        self.dts_us
    }
}

/// Outbound RTP timestamp state for one stream.
#[derive(Debug)]
pub struct RtpTiming {
    clock_rate: u32,
    base_timestamp_us: i64,
    cur_timestamp: u32,
    first_report_sent: bool,
}

impl RtpTiming {
    /// Anchor the stream at the current wall clock.
    ///
    /// The base is epoch microseconds rescaled into the stream clock
    /// rate, so a session restart (looping playback) reseeds it and
    /// timestamps across consecutive plays within one call keep
    /// increasing.
    pub fn new(clock_rate: u32) -> Self {
        let base_timestamp_us = epoch_micros();
        Self {
            clock_rate,
            base_timestamp_us,
            cur_timestamp: rescale(base_timestamp_us, clock_rate as i64, MICROS_PER_SEC) as u32,
            first_report_sent: false,
        }
    }

    /// Wire timestamp for a packet at decode time `dts_us`.
    pub fn timestamp_for(&mut self, dts_us: i64) -> u32 {
        let ts = rescale(
            self.base_timestamp_us + dts_us,
            self.clock_rate as i64,
            MICROS_PER_SEC,
        ) as u32;
        self.cur_timestamp = ts;
        ts
    }

    /// Wire timestamp for the next fixed-size audio packet; advances
    /// the clock by the packet's sample count. Keyed to emission, not
    /// to decode-chunk boundaries.
    pub fn take_and_advance(&mut self, samples: u32) -> u32 {
        let ts = self.cur_timestamp;
        self.cur_timestamp = ts.wrapping_add(samples);
        ts
    }

    pub fn cur_timestamp(&self) -> u32 {
        self.cur_timestamp
    }

    /// Whether the one-shot sender report for this stream went out.
    pub fn first_report_sent(&self) -> bool {
        self.first_report_sent
    }

    pub fn mark_report_sent(&mut self) {
        self.first_report_sent = true;
    }
}

fn epoch_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
