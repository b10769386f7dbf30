//! Session orchestration: the per-source-packet playout loop.
//!
//! [`Player`] pulls packets from a [`MediaSource`], routes video
//! through the H.264 payloader and audio through the repacketizer,
//! paces every emission against the wall clock, and polls the
//! [`ControlSource`] between packets for hangup, stop keys, and
//! pause/resume. One play ends when the source runs dry; the player
//! restarts the source until the configured repeat count or a stop
//! condition is reached.
//!
//! Error fatality is decided here: a video scratch overflow silences
//! the video stream and lets audio play on, while sink and source
//! failures end the session.

mod control;

pub use control::{ControlEvent, ControlSource, NullControl};

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::clock::{
    self, AUDIO_CLOCK_RATE, MICROS_PER_SEC, PlayoutClock, Rational, RtpTiming, StreamTiming,
    VIDEO_CLOCK_RATE,
};
use crate::error::{PlayoutError, Result};
use crate::media::h264::{H264Payloader, PayloadConfig};
use crate::media::pcma::{AudioRepacketizer, DEFAULT_SPLIT_SIZE};
use crate::media::{FrameSink, MediaKind, MediaSource, SourcePacket};
use crate::rtcp;

/// Poll interval for the control source while paused.
const PAUSE_POLL: Duration = Duration::from_millis(20);

/// Per-stream synchronization identity for the one-shot sender report.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// SSRC the media stream is being sent with.
    pub ssrc: u32,
    /// Media destination; the report goes to its port + 1.
    pub media_dest: SocketAddr,
}

/// Session-wide playback policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub payload: PayloadConfig,
    /// Audio packet size in bytes (160 = 20 ms of 8 kHz A-law).
    pub split_size: usize,
    /// Number of plays; 0 loops until a stop condition.
    pub repeat: u32,
    /// Hard wall-clock limit across all plays (pause time excluded).
    pub max_duration: Option<Duration>,
    /// Keys that end the session.
    pub stop_keys: Vec<char>,
    /// Key that pauses playback. `None` disables pausing.
    pub pause_key: Option<char>,
    /// Key that resumes; `None` means any non-stop key resumes.
    pub resume_key: Option<char>,
    /// Sender-report identity for video, when the sink is RTP-shaped.
    pub video_sync: Option<SyncConfig>,
    /// Sender-report identity for audio.
    pub audio_sync: Option<SyncConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            payload: PayloadConfig::default(),
            split_size: DEFAULT_SPLIT_SIZE,
            repeat: 1,
            max_duration: None,
            stop_keys: Vec::new(),
            pause_key: None,
            resume_key: None,
            video_sync: None,
            audio_sync: None,
        }
    }
}

/// Counters accumulated across every play of a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackStats {
    pub video_frames: u64,
    pub video_packets: u64,
    pub dropped_nals: u64,
    pub audio_packets: u64,
    pub audio_samples: u64,
}

/// Why the session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Source ended and the repeat count was satisfied.
    Finished,
    Hangup,
    Key(char),
    MaxDuration,
}

/// Final session result.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackOutcome {
    pub reason: StopReason,
    /// Completed or partially completed plays.
    pub plays: u32,
    pub stats: PlaybackStats,
    /// Total time spent paused.
    pub paused: Duration,
}

/// Drives one playback session over borrowed collaborator seams.
pub struct Player<'a> {
    source: &'a mut dyn MediaSource,
    sink: &'a mut dyn FrameSink,
    control: &'a mut dyn ControlSource,
    config: SessionConfig,
    stats: PlaybackStats,
}

impl<'a> Player<'a> {
    pub fn new(
        source: &'a mut dyn MediaSource,
        sink: &'a mut dyn FrameSink,
        control: &'a mut dyn ControlSource,
        config: SessionConfig,
    ) -> Self {
        Self {
            source,
            sink,
            control,
            config,
            stats: PlaybackStats::default(),
        }
    }

    /// Play until the source finishes (honoring `repeat`) or a stop
    /// condition fires.
    pub fn run(mut self) -> Result<PlaybackOutcome> {
        let session_started = Instant::now();
        let mut plays = 0u32;
        let mut paused = Duration::ZERO;

        let reason = loop {
            // The time limit spans plays; each play gets what is left
            // of it, with pause time credited back.
            let remaining = self.config.max_duration.map(|limit| {
                let elapsed = session_started.elapsed().saturating_sub(paused);
                limit.saturating_sub(elapsed)
            });
            let play = self.play_once(remaining)?;
            plays += 1;
            paused += play.paused;

            if let Some(reason) = play.reason {
                break reason;
            }
            if self.config.repeat != 0 && plays >= self.config.repeat {
                break StopReason::Finished;
            }
            if !self.source.restart()? {
                tracing::debug!("source cannot restart, ending session");
                break StopReason::Finished;
            }
            tracing::debug!(plays, "restarting playback");
        };

        tracing::info!(
            ?reason,
            plays,
            video_frames = self.stats.video_frames,
            video_packets = self.stats.video_packets,
            audio_packets = self.stats.audio_packets,
            paused_ms = paused.as_millis() as u64,
            "session finished"
        );
        Ok(PlaybackOutcome {
            reason,
            plays,
            stats: self.stats,
            paused,
        })
    }

    /// One pass over the source. `reason: None` means clean end of
    /// stream; `remaining` is the unused part of the session time
    /// limit.
    fn play_once(&mut self, remaining: Option<Duration>) -> Result<PlayResult> {
        let info = self.source.info();
        let first_video_dts = clock::initial_video_dts_us(info.frame_rate, info.reorder_frames);

        let mut clock = PlayoutClock::start();
        let mut video = VideoStream::new(&self.config, first_video_dts)?;
        let mut audio = AudioStream::new(&self.config)?;

        let reason = loop {
            if let Some(remaining) = remaining {
                if clock.elapsed_us() >= remaining.as_micros() as i64 {
                    break Some(StopReason::MaxDuration);
                }
            }
            if let Some(reason) = self.check_control(&mut clock)? {
                break Some(reason);
            }

            let Some(packet) = self.source.read()? else {
                break None;
            };
            match packet {
                SourcePacket::Video { data, duration } => {
                    video.send(self.sink, &clock, &data, duration, &mut self.stats)?;
                }
                SourcePacket::Audio { data, samples } => {
                    tracing::trace!(bytes = data.len(), samples, "audio chunk from source");
                    audio.send(self.sink, &clock, &data, &mut self.stats)?;
                }
            }
        };

        audio.finish(self.sink, &clock, &mut self.stats)?;
        self.stats.dropped_nals += video.payloader.dropped_nals();
        Ok(PlayResult {
            reason,
            paused: clock.paused(),
        })
    }

    /// Non-blocking look at the control source; handles pause in-line.
    fn check_control(&mut self, clock: &mut PlayoutClock) -> Result<Option<StopReason>> {
        match self.control.poll(Duration::ZERO)? {
            None => Ok(None),
            Some(ControlEvent::Hangup) => Ok(Some(StopReason::Hangup)),
            Some(ControlEvent::Key(key)) => {
                if self.config.stop_keys.contains(&key) {
                    return Ok(Some(StopReason::Key(key)));
                }
                if self.config.pause_key == Some(key) {
                    return self.wait_resume(clock);
                }
                tracing::trace!(?key, "ignoring key");
                Ok(None)
            }
        }
    }

    /// Block until resume, accounting the pause so timestamps carry on
    /// without a discontinuity. A stop condition during the pause still
    /// ends the session.
    fn wait_resume(&mut self, clock: &mut PlayoutClock) -> Result<Option<StopReason>> {
        let pause_started = Instant::now();
        tracing::info!("playback paused");

        let stop = loop {
            match self.control.poll(PAUSE_POLL)? {
                Some(ControlEvent::Hangup) => break Some(StopReason::Hangup),
                Some(ControlEvent::Key(key)) => {
                    if self.config.stop_keys.contains(&key) {
                        break Some(StopReason::Key(key));
                    }
                    let resumes = match self.config.resume_key {
                        Some(resume) => key == resume,
                        None => true,
                    };
                    if resumes {
                        break None;
                    }
                }
                None => {}
            }
        };

        let interval = pause_started.elapsed();
        clock.add_pause(interval);
        tracing::info!(paused_ms = interval.as_millis() as u64, "playback resumed");
        Ok(stop)
    }
}

struct PlayResult {
    reason: Option<StopReason>,
    paused: Duration,
}

/// Per-play video pipeline: pacing, wire timestamps, payloading.
struct VideoStream {
    payloader: H264Payloader,
    timing: StreamTiming,
    rtp: RtpTiming,
    sync: Option<SyncConfig>,
    first_dts_us: i64,
    failed: bool,
}

impl VideoStream {
    fn new(config: &SessionConfig, first_dts_us: i64) -> Result<Self> {
        Ok(Self {
            payloader: H264Payloader::new(config.payload.clone())?,
            timing: StreamTiming::new(),
            rtp: RtpTiming::new(VIDEO_CLOCK_RATE),
            sync: config.video_sync,
            first_dts_us,
            failed: false,
        })
    }

    fn send(
        &mut self,
        sink: &mut dyn FrameSink,
        clock: &PlayoutClock,
        data: &[u8],
        duration: Rational,
        stats: &mut PlaybackStats,
    ) -> Result<()> {
        if self.failed {
            return Ok(());
        }

        let dts = self.timing.advance(self.first_dts_us, duration.to_micros());
        clock.pace(dts);
        let timestamp = self.rtp.timestamp_for(dts);

        if !self.rtp.first_report_sent() {
            if let Some(sync) = self.sync {
                rtcp::send_first_sr(sync.media_dest, sync.ssrc, timestamp);
            }
            self.rtp.mark_report_sent();
        }

        match self.payloader.send_access_unit(sink, data, timestamp) {
            Ok(packets) => {
                stats.video_frames += 1;
                stats.video_packets += packets as u64;
                Ok(())
            }
            Err(PlayoutError::ScratchOverflow { required, capacity }) => {
                tracing::error!(
                    required,
                    capacity,
                    "video payloader overflow, stopping video stream"
                );
                self.failed = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Per-play audio pipeline: repacketization, per-packet pacing and
/// timestamps.
struct AudioStream {
    repacketizer: AudioRepacketizer,
    rtp: RtpTiming,
    sync: Option<SyncConfig>,
    dts_us: i64,
}

impl AudioStream {
    fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            repacketizer: AudioRepacketizer::new(config.split_size)?,
            rtp: RtpTiming::new(AUDIO_CLOCK_RATE),
            sync: config.audio_sync,
            dts_us: 0,
        })
    }

    fn send(
        &mut self,
        sink: &mut dyn FrameSink,
        clock: &PlayoutClock,
        data: &[u8],
        stats: &mut PlaybackStats,
    ) -> Result<()> {
        let Self {
            repacketizer,
            rtp,
            sync,
            dts_us,
        } = self;
        repacketizer.repack(data, |packet| {
            emit_audio_packet(sink, clock, rtp, sync, dts_us, packet, stats)
        })?;
        Ok(())
    }

    /// End-of-stream: push out the carried residual as a short packet.
    fn finish(
        &mut self,
        sink: &mut dyn FrameSink,
        clock: &PlayoutClock,
        stats: &mut PlaybackStats,
    ) -> Result<()> {
        let Self {
            repacketizer,
            rtp,
            sync,
            dts_us,
        } = self;
        repacketizer.flush(|packet| {
            emit_audio_packet(sink, clock, rtp, sync, dts_us, packet, stats)
        })?;
        Ok(())
    }
}

fn emit_audio_packet(
    sink: &mut dyn FrameSink,
    clock: &PlayoutClock,
    rtp: &mut RtpTiming,
    sync: &Option<SyncConfig>,
    dts_us: &mut i64,
    packet: &[u8],
    stats: &mut PlaybackStats,
) -> Result<()> {
    clock.pace(*dts_us);

    // A-law: one byte per sample.
    let samples = packet.len() as u32;
    let timestamp = rtp.take_and_advance(samples);

    if !rtp.first_report_sent() {
        if let Some(sync) = sync {
            rtcp::send_first_sr(sync.media_dest, sync.ssrc, timestamp);
        }
        rtp.mark_report_sent();
    }

    sink.send(MediaKind::Audio, packet, timestamp, false)?;
    *dts_us += clock::rescale(samples as i64, MICROS_PER_SEC, AUDIO_CLOCK_RATE as i64);
    stats.audio_packets += 1;
    stats.audio_samples += samples as u64;
    Ok(())
}
