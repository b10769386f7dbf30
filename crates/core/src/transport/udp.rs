use std::net::{SocketAddr, UdpSocket};

use super::rtp::RtpHeader;
use crate::error::{PlayoutError, Result};
use crate::media::{FrameSink, MediaKind};

/// Dynamic payload type used for H.264 (RFC 6184 §8.2.1).
pub const VIDEO_PAYLOAD_TYPE: u8 = 96;

/// Static payload type for PCMA (RFC 3551 §6).
pub const AUDIO_PAYLOAD_TYPE: u8 = 8;

struct StreamOut {
    header: RtpHeader,
    dest: SocketAddr,
}

/// Reference [`FrameSink`] sending RTP over UDP.
///
/// Binds a single ephemeral socket (`0.0.0.0:0`) and prefixes each
/// payload with a 12-byte RTP header before sending it to the stream's
/// destination. One sequence/SSRC state per stream; a stream without a
/// configured destination rejects frames.
///
/// Address-only by design — session state, pacing and timestamps are
/// the caller's business.
pub struct UdpFrameSink {
    socket: UdpSocket,
    video: Option<StreamOut>,
    audio: Option<StreamOut>,
    packet: Vec<u8>,
}

impl UdpFrameSink {
    /// Bind an ephemeral UDP socket for outbound RTP.
    pub fn bind(video_dest: Option<SocketAddr>, audio_dest: Option<SocketAddr>) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            video: video_dest.map(|dest| StreamOut {
                header: RtpHeader::with_random_ssrc(VIDEO_PAYLOAD_TYPE),
                dest,
            }),
            audio: audio_dest.map(|dest| StreamOut {
                header: RtpHeader::with_random_ssrc(AUDIO_PAYLOAD_TYPE),
                dest,
            }),
            packet: Vec::with_capacity(1500),
        })
    }

    /// SSRC of the video stream, when one is configured. Needed by the
    /// session to stamp the matching sender report.
    pub fn video_ssrc(&self) -> Option<u32> {
        self.video.as_ref().map(|s| s.header.ssrc)
    }

    /// SSRC of the audio stream, when one is configured.
    pub fn audio_ssrc(&self) -> Option<u32> {
        self.audio.as_ref().map(|s| s.header.ssrc)
    }
}

impl FrameSink for UdpFrameSink {
    fn send(
        &mut self,
        kind: MediaKind,
        payload: &[u8],
        timestamp: u32,
        marker: bool,
    ) -> Result<()> {
        let stream = match kind {
            MediaKind::Video => self.video.as_mut(),
            MediaKind::Audio => self.audio.as_mut(),
        };
        let Some(stream) = stream else {
            return Err(PlayoutError::Sink {
                kind,
                reason: "no destination configured for stream".into(),
            });
        };

        self.packet.clear();
        self.packet
            .extend_from_slice(&stream.header.write(timestamp, marker));
        self.packet.extend_from_slice(payload);
        self.socket.send_to(&self.packet, stream.dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivery() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let dest = receiver.local_addr().unwrap();

        let mut sink = UdpFrameSink::bind(Some(dest), None).unwrap();
        sink.send(MediaKind::Video, &[0xAA, 0xBB], 1234, true).unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(n, 14, "12-byte header plus payload");
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf[1] & 0x7f, VIDEO_PAYLOAD_TYPE);
        assert_eq!(buf[1] & 0x80, 0x80);
        assert_eq!(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 1234);
        assert_eq!(&buf[12..14], &[0xAA, 0xBB]);
    }

    #[test]
    fn missing_stream_rejected() {
        let mut sink = UdpFrameSink::bind(None, None).unwrap();
        let err = sink.send(MediaKind::Audio, &[0], 0, false);
        assert!(matches!(err, Err(PlayoutError::Sink { .. })));
    }

    #[test]
    fn ssrc_exposed_per_stream() {
        let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let sink = UdpFrameSink::bind(Some(dest), Some(dest)).unwrap();
        assert!(sink.video_ssrc().is_some());
        assert!(sink.audio_ssrc().is_some());
        let sink = UdpFrameSink::bind(None, Some(dest)).unwrap();
        assert!(sink.video_ssrc().is_none());
    }
}
