use super::annexb::NalUnits;
use super::{FrameSink, MediaKind};
use crate::error::{PlayoutError, Result};

/// Fixed scratch capacity backing fragmentation and aggregation.
///
/// Matches the frame payload capacity of the downstream sink; a NAL
/// that cannot be staged here is an unrecoverable per-call error.
pub const SCRATCH_CAPACITY: usize = 1460;

const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1400;

/// FU indicator type value (RFC 6184 §5.8).
const FU_A: u8 = 28;
/// STAP-A indicator byte (RFC 6184 §5.7).
const STAP_A: u8 = 24;

/// Packetization knobs for one video stream.
#[derive(Debug, Clone)]
pub struct PayloadConfig {
    /// Largest payload emitted in one frame.
    pub max_payload_size: usize,
    /// When false ("mode 0"), oversize NALs are dropped instead of
    /// fragmented.
    pub fragmentation: bool,
    /// STAP-A aggregation of small NALs. Kept as an option; off by
    /// default.
    pub aggregation: bool,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            fragmentation: true,
            aggregation: false,
        }
    }
}

/// H.264 access-unit payloader (RFC 6184).
///
/// Splits an Annex B access unit into sink frames using two
/// packetization modes:
///
/// - **Single NAL Unit** (§5.6): NALs within `max_payload_size` are
///   emitted as-is.
/// - **FU-A fragmentation** (§5.8): larger NALs are split, each
///   fragment prefixed with a 2-byte FU header:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (max_payload_size - 2 bytes)
///   ```
///
///   **S** is set on the first fragment, **E** on the last.
///
/// STAP-A aggregation (§5.7) is wired in but disabled by default: a
/// 1-byte indicator, then a 2-byte big-endian length plus payload per
/// NAL. Flushing an aggregation holding exactly one NAL strips the
/// framing and sends it as a single NAL unit.
///
/// The sink marker is set only on the frame that ends the access unit.
#[derive(Debug)]
pub struct H264Payloader {
    config: PayloadConfig,
    buf: Vec<u8>,
    buf_len: usize,
    buffered_nals: usize,
    dropped_nals: u64,
}

impl H264Payloader {
    pub fn new(config: PayloadConfig) -> Result<Self> {
        // Room for the FU header per fragment, and for the STAP-A
        // indicator plus one length prefix when aggregating.
        if config.max_payload_size < 2 || config.max_payload_size + 3 > SCRATCH_CAPACITY {
            return Err(PlayoutError::InvalidPayloadSize(config.max_payload_size));
        }
        Ok(Self {
            config,
            buf: vec![0u8; SCRATCH_CAPACITY],
            buf_len: 0,
            buffered_nals: 0,
            dropped_nals: 0,
        })
    }

    /// NALs dropped because fragmentation was disabled.
    pub fn dropped_nals(&self) -> u64 {
        self.dropped_nals
    }

    /// Packetize one access unit and emit every frame through `sink`.
    ///
    /// All frames of the unit carry `timestamp`; the marker is true on
    /// the final frame only. Returns the number of frames sent.
    pub fn send_access_unit(
        &mut self,
        sink: &mut dyn FrameSink,
        data: &[u8],
        timestamp: u32,
    ) -> Result<usize> {
        self.buf_len = 0;
        self.buffered_nals = 0;

        let mut sent = 0;
        let mut nals = NalUnits::new(data).peekable();
        while let Some(nal) = nals.next() {
            let last = nals.peek().is_none();
            self.send_nal(sink, nal, timestamp, last, &mut sent)?;
        }
        self.flush(sink, timestamp, true, &mut sent)?;

        tracing::trace!(
            frame_bytes = data.len(),
            frames = sent,
            timestamp,
            "access unit packetized"
        );
        Ok(sent)
    }

    fn send_nal(
        &mut self,
        sink: &mut dyn FrameSink,
        nal: &[u8],
        timestamp: u32,
        last: bool,
        sent: &mut usize,
    ) -> Result<()> {
        let max = self.config.max_payload_size;
        let nal_type = nal[0] & 0x1f;
        tracing::trace!(nal_type, nal_size = nal.len(), last, "sending NAL");

        if nal.len() <= max {
            // Flush buffered NALs if this one doesn't fit alongside them.
            if self.buf_len + 2 + nal.len() > max {
                self.flush(sink, timestamp, false, sent)?;
            }
            // With aggregation on and room for the framing (2-byte
            // length, 1-byte indicator), stage it; otherwise send as a
            // single NAL unit.
            if self.config.aggregation && self.buf_len + 3 + nal.len() <= max {
                self.append_aggregate(nal)?;
            } else {
                self.flush(sink, timestamp, false, sent)?;
                sink.send(MediaKind::Video, nal, timestamp, last)?;
                *sent += 1;
            }
            return Ok(());
        }

        self.flush(sink, timestamp, false, sent)?;
        if !self.config.fragmentation {
            self.dropped_nals += 1;
            tracing::warn!(
                nal_type,
                nal_size = nal.len(),
                max_payload_size = max,
                "oversize NAL dropped (fragmentation disabled)"
            );
            return Ok(());
        }
        self.fragment_nal(sink, nal, timestamp, last, sent)
    }

    /// FU-A fragmentation through the scratch buffer.
    fn fragment_nal(
        &mut self,
        sink: &mut dyn FrameSink,
        nal: &[u8],
        timestamp: u32,
        last: bool,
        sent: &mut usize,
    ) -> Result<()> {
        let max = self.config.max_payload_size;
        if max > self.buf.len() {
            return Err(PlayoutError::ScratchOverflow {
                required: max,
                capacity: self.buf.len(),
            });
        }

        let nal_type = nal[0] & 0x1f;
        let nri = nal[0] & 0x60;
        self.buf[0] = FU_A | nri;
        self.buf[1] = nal_type | 0x80; // start bit
        let header_size = 2;

        let mut payload = &nal[1..];
        while payload.len() + header_size > max {
            let chunk = max - header_size;
            self.buf[header_size..max].copy_from_slice(&payload[..chunk]);
            sink.send(MediaKind::Video, &self.buf[..max], timestamp, false)?;
            *sent += 1;
            payload = &payload[chunk..];
            self.buf[1] &= !0x80;
        }
        self.buf[1] |= 0x40; // end bit
        self.buf[header_size..header_size + payload.len()].copy_from_slice(payload);
        sink.send(
            MediaKind::Video,
            &self.buf[..header_size + payload.len()],
            timestamp,
            last,
        )?;
        *sent += 1;

        tracing::trace!(nal_type, nal_size = nal.len(), "FU-A fragmented NAL");
        Ok(())
    }

    /// Stage one NAL into the STAP-A aggregation buffer.
    fn append_aggregate(&mut self, nal: &[u8]) -> Result<()> {
        let required = self.buf_len.max(1) + 2 + nal.len();
        if required > self.buf.len() {
            return Err(PlayoutError::ScratchOverflow {
                required,
                capacity: self.buf.len(),
            });
        }
        if self.buf_len == 0 {
            self.buf[0] = STAP_A;
            self.buf_len = 1;
        }
        self.buf[self.buf_len..self.buf_len + 2]
            .copy_from_slice(&(nal.len() as u16).to_be_bytes());
        self.buf_len += 2;
        self.buf[self.buf_len..self.buf_len + nal.len()].copy_from_slice(nal);
        self.buf_len += nal.len();
        self.buffered_nals += 1;
        Ok(())
    }

    /// Send any pending aggregation. A single buffered NAL goes out
    /// without the STAP-A framing.
    fn flush(
        &mut self,
        sink: &mut dyn FrameSink,
        timestamp: u32,
        last: bool,
        sent: &mut usize,
    ) -> Result<()> {
        if self.buf_len > 0 {
            if self.buffered_nals == 1 {
                sink.send(MediaKind::Video, &self.buf[3..self.buf_len], timestamp, last)?;
            } else {
                sink.send(MediaKind::Video, &self.buf[..self.buf_len], timestamp, last)?;
            }
            *sent += 1;
        }
        self.buf_len = 0;
        self.buffered_nals = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink recording (kind, payload, timestamp, marker) tuples.
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<(MediaKind, Vec<u8>, u32, bool)>,
    }

    impl FrameSink for RecordingSink {
        fn send(
            &mut self,
            kind: MediaKind,
            payload: &[u8],
            timestamp: u32,
            marker: bool,
        ) -> Result<()> {
            self.frames.push((kind, payload.to_vec(), timestamp, marker));
            Ok(())
        }
    }

    fn payloader(config: PayloadConfig) -> H264Payloader {
        H264Payloader::new(config).unwrap()
    }

    fn annexb(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in nals {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(nal);
        }
        out
    }

    #[test]
    fn rejects_bad_payload_size() {
        for bad in [0, 1, SCRATCH_CAPACITY] {
            let cfg = PayloadConfig {
                max_payload_size: bad,
                ..PayloadConfig::default()
            };
            assert!(matches!(
                H264Payloader::new(cfg),
                Err(PlayoutError::InvalidPayloadSize(_))
            ));
        }
    }

    #[test]
    fn small_nal_single_frame_with_marker() {
        let mut p = payloader(PayloadConfig::default());
        let mut sink = RecordingSink::default();
        let au = annexb(&[&[0x65, 0xAA, 0xBB, 0xCC]]);
        let sent = p.send_access_unit(&mut sink, &au, 1234).unwrap();
        assert_eq!(sent, 1);
        let (kind, payload, ts, marker) = &sink.frames[0];
        assert_eq!(*kind, MediaKind::Video);
        assert_eq!(payload, &vec![0x65, 0xAA, 0xBB, 0xCC]);
        assert_eq!(*ts, 1234);
        assert!(marker);
    }

    #[test]
    fn marker_only_on_last_nal() {
        let mut p = payloader(PayloadConfig::default());
        let mut sink = RecordingSink::default();
        let au = annexb(&[&[0x67, 0x42], &[0x68, 0xCE], &[0x65, 0x88]]);
        p.send_access_unit(&mut sink, &au, 0).unwrap();
        let markers: Vec<bool> = sink.frames.iter().map(|f| f.3).collect();
        assert_eq!(markers, vec![false, false, true]);
    }

    #[test]
    fn fragments_4000_byte_nal_at_1400() {
        let mut p = payloader(PayloadConfig::default());
        let mut sink = RecordingSink::default();
        let mut nal = vec![0x65u8];
        nal.extend((1u32..4000).map(|i| (i % 251) as u8));
        assert_eq!(nal.len(), 4000);
        let au = annexb(&[&nal]);
        let sent = p.send_access_unit(&mut sink, &au, 90_000).unwrap();
        assert_eq!(sent, 3);

        // 3999 payload bytes behind a 2-byte FU header: two full
        // fragments of 1400 and a tail of 1203 + 2.
        let sizes: Vec<usize> = sink.frames.iter().map(|f| f.1.len()).collect();
        assert_eq!(sizes, vec![1400, 1400, 1205]);

        for (i, (_, frame, ts, marker)) in sink.frames.iter().enumerate() {
            assert_eq!(frame[0] & 0x1f, 28, "FU-A indicator");
            assert_eq!(frame[0] & 0x60, 0x65 & 0x60, "NRI carried over");
            assert_eq!(frame[1] & 0x1f, 5, "original NAL type");
            assert_eq!(frame[1] & 0x80 != 0, i == 0, "start bit");
            assert_eq!(frame[1] & 0x40 != 0, i == 2, "end bit");
            assert_eq!(*marker, i == 2, "marker on last fragment");
            assert_eq!(*ts, 90_000);
        }
    }

    /// Reassembling FU-A fragments restores the original NAL for any
    /// size around the fragmentation threshold.
    #[test]
    fn fragment_round_trip() {
        for nal_size in [1401usize, 1402, 2799, 2800, 2801, 5000] {
            let mut p = payloader(PayloadConfig::default());
            let mut sink = RecordingSink::default();
            let mut nal = vec![0x41u8];
            nal.extend((1..nal_size as u32).map(|i| (i % 255) as u8));
            let au = annexb(&[&nal]);
            p.send_access_unit(&mut sink, &au, 0).unwrap();

            let first = &sink.frames[0].1;
            let mut rebuilt = vec![(first[0] & 0x60) | (first[1] & 0x1f)];
            for (_, frame, _, _) in &sink.frames {
                rebuilt.extend_from_slice(&frame[2..]);
            }
            assert_eq!(rebuilt, nal, "round trip failed for size {nal_size}");
        }
    }

    #[test]
    fn mode0_drops_oversize_nal() {
        let cfg = PayloadConfig {
            fragmentation: false,
            ..PayloadConfig::default()
        };
        let mut p = payloader(cfg);
        let mut sink = RecordingSink::default();
        let big = vec![0x65u8; 2000];
        let au = annexb(&[&[0x67, 0x42], &big]);
        let sent = p.send_access_unit(&mut sink, &au, 0).unwrap();
        assert_eq!(sent, 1, "only the small NAL goes out");
        assert_eq!(p.dropped_nals(), 1);
    }

    #[test]
    fn aggregation_bundles_small_nals() {
        let cfg = PayloadConfig {
            aggregation: true,
            ..PayloadConfig::default()
        };
        let mut p = payloader(cfg);
        let mut sink = RecordingSink::default();
        let au = annexb(&[&[0x67, 0x42, 0x00], &[0x68, 0xCE]]);
        let sent = p.send_access_unit(&mut sink, &au, 0).unwrap();
        assert_eq!(sent, 1);

        let frame = &sink.frames[0].1;
        assert_eq!(frame[0], 24, "STAP-A indicator");
        assert_eq!(&frame[1..3], &[0, 3], "first NAL length");
        assert_eq!(&frame[3..6], &[0x67, 0x42, 0x00]);
        assert_eq!(&frame[6..8], &[0, 2], "second NAL length");
        assert_eq!(&frame[8..10], &[0x68, 0xCE]);
        assert!(sink.frames[0].3, "aggregate ends the access unit");
    }

    #[test]
    fn single_buffered_nal_flushed_without_framing() {
        let cfg = PayloadConfig {
            aggregation: true,
            ..PayloadConfig::default()
        };
        let mut p = payloader(cfg);
        let mut sink = RecordingSink::default();
        let au = annexb(&[&[0x67, 0x42, 0x00, 0x1e]]);
        p.send_access_unit(&mut sink, &au, 0).unwrap();
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].1, vec![0x67, 0x42, 0x00, 0x1e]);
    }

    #[test]
    fn aggregation_flushes_when_full() {
        let cfg = PayloadConfig {
            max_payload_size: 20,
            aggregation: true,
            ..PayloadConfig::default()
        };
        let mut p = payloader(cfg);
        let mut sink = RecordingSink::default();
        let a = [0x41u8; 6];
        let b = [0x42u8; 6];
        let c = [0x43u8; 6];
        let au = annexb(&[&a, &b, &c]);
        p.send_access_unit(&mut sink, &au, 0).unwrap();

        // a+b fill the aggregate (1 + 2*(2+6) = 17; adding c would need
        // 25 > 20), so c flushes them and starts a new one.
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[0].1[0], 24);
        assert_eq!(sink.frames[0].1.len(), 17);
        assert!(!sink.frames[0].3);
        assert_eq!(sink.frames[1].1, c.to_vec(), "lone NAL unwrapped");
        assert!(sink.frames[1].3);
    }

    #[test]
    fn small_payload_size_still_round_trips() {
        // max_payload_size = 2 means 0 data bytes per full fragment is
        // impossible; smallest useful value still has to terminate.
        let cfg = PayloadConfig {
            max_payload_size: 3,
            ..PayloadConfig::default()
        };
        let mut p = payloader(cfg);
        let mut sink = RecordingSink::default();
        let nal = [0x41u8, 1, 2, 3, 4];
        let au = annexb(&[&nal]);
        p.send_access_unit(&mut sink, &au, 0).unwrap();
        let mut rebuilt = vec![0x41u8];
        for (_, frame, _, _) in &sink.frames {
            rebuilt.extend_from_slice(&frame[2..]);
        }
        assert_eq!(rebuilt, nal.to_vec());
    }
}
