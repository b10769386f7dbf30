use std::fs;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use playout::clock::Rational;
use playout::media::annexb::NalUnits;
use playout::media::h264::PayloadConfig;
use playout::transport::UdpFrameSink;
use playout::{
    MediaSource, NullControl, Player, Result, SessionConfig, SourceInfo, SourcePacket, SyncConfig,
};

#[derive(Parser)]
#[command(
    name = "playout-player",
    about = "Streams raw H.264 and A-law files as paced RTP"
)]
struct Args {
    /// Raw Annex B H.264 elementary stream
    #[arg(long)]
    video: Option<String>,

    /// Raw 8 kHz A-law audio file
    #[arg(long)]
    audio: Option<String>,

    /// Video RTP destination (host:port); RTCP goes to port + 1
    #[arg(long, default_value = "127.0.0.1:5004")]
    video_dest: SocketAddr,

    /// Audio RTP destination (host:port); RTCP goes to port + 1
    #[arg(long, default_value = "127.0.0.1:5006")]
    audio_dest: SocketAddr,

    /// Video frame rate
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Largest RTP payload before FU-A fragmentation kicks in
    #[arg(long, default_value_t = 1400)]
    max_payload: usize,

    /// Plays; 0 loops until interrupted
    #[arg(long, short, default_value_t = 1)]
    repeat: u32,

    /// Stop after this many seconds of playback
    #[arg(long)]
    duration: Option<u64>,
}

/// Audio chunk size fed to the session, deliberately not a multiple of
/// the 160-byte packet size so the repacketizer's residual path runs.
const AUDIO_CHUNK: usize = 320;

/// In-memory source built from raw elementary-stream files.
///
/// Video and audio packets are interleaved by accumulated stream time
/// so neither stream runs ahead of the other at the pacing layer.
struct FileSource {
    packets: Vec<SourcePacket>,
    cursor: usize,
    frame_rate: Rational,
}

impl FileSource {
    fn load(args: &Args) -> std::io::Result<Self> {
        let frame_rate = Rational::new(args.fps.max(1) as i64, 1);
        let frame_duration = Rational::new(1, args.fps.max(1) as i64);

        let mut video = Vec::new();
        if let Some(path) = &args.video {
            let data = fs::read(path)?;
            video = split_access_units(&data);
            tracing::info!(path, access_units = video.len(), "loaded video stream");
        }

        let mut audio = Vec::new();
        if let Some(path) = &args.audio {
            let data = fs::read(path)?;
            audio = data.chunks(AUDIO_CHUNK).map(|c| c.to_vec()).collect();
            tracing::info!(path, bytes = data.len(), "loaded audio stream");
        }

        // Merge the two streams ordered by their accumulated play time.
        let mut packets = Vec::with_capacity(video.len() + audio.len());
        let frame_us = frame_duration.to_micros();
        let chunk_us = |bytes: usize| bytes as i64 * 1_000_000 / 8_000;
        let mut video = video.into_iter().peekable();
        let mut audio = audio.into_iter().peekable();
        let (mut v_time, mut a_time) = (0i64, 0i64);
        loop {
            let take_video = match (video.peek().is_some(), audio.peek().is_some()) {
                (false, false) => break,
                (true, false) => true,
                (false, true) => false,
                (true, true) => v_time <= a_time,
            };
            if take_video {
                if let Some(data) = video.next() {
                    v_time += frame_us;
                    packets.push(SourcePacket::Video {
                        data,
                        duration: frame_duration,
                    });
                }
            } else if let Some(data) = audio.next() {
                a_time += chunk_us(data.len());
                let samples = data.len() as u32;
                packets.push(SourcePacket::Audio { data, samples });
            }
        }

        Ok(Self {
            packets,
            cursor: 0,
            frame_rate,
        })
    }
}

impl MediaSource for FileSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            frame_rate: Some(self.frame_rate),
            reorder_frames: 0,
        }
    }

    fn read(&mut self) -> Result<Option<SourcePacket>> {
        let packet = self.packets.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(packet)
    }

    fn restart(&mut self) -> Result<bool> {
        self.cursor = 0;
        Ok(true)
    }
}

/// Group a raw Annex B stream into access units.
///
/// Parameter sets and SEI (types 6..=8) attach to the following slice;
/// a VCL NAL (types 1..=5) closes the unit. Each unit keeps 4-byte
/// start codes so the payloader sees ordinary Annex B input.
fn split_access_units(data: &[u8]) -> Vec<Vec<u8>> {
    let mut units = Vec::new();
    let mut current = Vec::new();
    for nal in NalUnits::new(data) {
        current.extend_from_slice(&[0, 0, 0, 1]);
        current.extend_from_slice(nal);
        let nal_type = nal[0] & 0x1f;
        if (1..=5).contains(&nal_type) {
            units.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        units.push(current);
    }
    units
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if args.video.is_none() && args.audio.is_none() {
        eprintln!("nothing to play: pass --video and/or --audio");
        return ExitCode::FAILURE;
    }

    let mut source = match FileSource::load(&args) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("failed to load media: {e}");
            return ExitCode::FAILURE;
        }
    };

    let video_dest = args.video.as_ref().map(|_| args.video_dest);
    let audio_dest = args.audio.as_ref().map(|_| args.audio_dest);
    let mut sink = match UdpFrameSink::bind(video_dest, audio_dest) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("failed to open RTP socket: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = SessionConfig {
        payload: PayloadConfig {
            max_payload_size: args.max_payload,
            ..PayloadConfig::default()
        },
        repeat: args.repeat,
        max_duration: args.duration.map(Duration::from_secs),
        video_sync: sink.video_ssrc().map(|ssrc| SyncConfig {
            ssrc,
            media_dest: args.video_dest,
        }),
        audio_sync: sink.audio_ssrc().map(|ssrc| SyncConfig {
            ssrc,
            media_dest: args.audio_dest,
        }),
        ..SessionConfig::default()
    };

    let mut control = NullControl;
    match Player::new(&mut source, &mut sink, &mut control, config).run() {
        Ok(outcome) => {
            println!(
                "done ({:?}): {} plays, {} video frames / {} packets, {} audio packets",
                outcome.reason,
                outcome.plays,
                outcome.stats.video_frames,
                outcome.stats.video_packets,
                outcome.stats.audio_packets
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("playback failed: {e}");
            ExitCode::FAILURE
        }
    }
}
