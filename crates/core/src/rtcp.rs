//! Minimal RTCP sender reports (RFC 3550 §6.4.1).
//!
//! One report per stream, sent once when the first media packet's
//! timestamp is known. It anchors the stream's RTP clock to wall time
//! so a receiver can align audio and video; packet and octet counts
//! stay zero because nothing here tracks a running session.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|    RC   |   PT=SR=200   |            length=6           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           SSRC                                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              NTP timestamp, most significant word             |
//! |              NTP timestamp, least significant word            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         RTP timestamp                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     sender's packet count = 0                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     sender's octet count = 0                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::net::{SocketAddr, UdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

/// Size of the fixed sender-report layout.
pub const SENDER_REPORT_LEN: usize = 28;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const PT_SENDER_REPORT: u8 = 200;

/// Microseconds into the second as a 32-bit NTP fraction.
///
/// `micros / 1e6 * 2^32`, staged as shift-and-divide rounds so every
/// intermediate fits in 64 bits without losing low bits:
/// `2^32 / 1e6 = 2^26 / 125^2`, applied as
/// `(((micros << 12) / 125 << 7) / 125) << 7`.
fn ntp_fraction(micros: u32) -> u32 {
    let f = (micros as u64) << 12;
    let f = (f / 125) << 7;
    let f = (f / 125) << 7;
    f as u32
}

/// NTP 32.32 fixed-point timestamp for a wall-clock instant.
fn ntp_timestamp(now: SystemTime) -> (u32, u32) {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = (since_epoch.as_secs() + NTP_UNIX_OFFSET) as u32;
    (secs, ntp_fraction(since_epoch.subsec_micros()))
}

/// Build the 28-byte sender report for `now`.
pub fn build_sender_report(
    ssrc: u32,
    rtp_timestamp: u32,
    now: SystemTime,
) -> [u8; SENDER_REPORT_LEN] {
    let (ntp_sec, ntp_frac) = ntp_timestamp(now);

    let mut buf = [0u8; SENDER_REPORT_LEN];
    buf[0] = 0x80; // V=2, P=0, RC=0
    buf[1] = PT_SENDER_REPORT;
    buf[2..4].copy_from_slice(&6u16.to_be_bytes()); // length in words - 1
    buf[4..8].copy_from_slice(&ssrc.to_be_bytes());
    buf[8..12].copy_from_slice(&ntp_sec.to_be_bytes());
    buf[12..16].copy_from_slice(&ntp_frac.to_be_bytes());
    buf[16..20].copy_from_slice(&rtp_timestamp.to_be_bytes());
    // packet count and octet count stay zero
    buf
}

/// RTCP destination for a media destination: same address, port + 1.
pub fn rtcp_addr(media: SocketAddr) -> SocketAddr {
    let mut addr = media;
    addr.set_port(media.port().wrapping_add(1));
    addr
}

/// Send the one-shot sender report for a stream, best effort.
///
/// Socket and send failures are logged and swallowed; the stream plays
/// on without a sync anchor.
pub fn send_first_sr(media_dest: SocketAddr, ssrc: u32, rtp_timestamp: u32) {
    let dest = rtcp_addr(media_dest);
    let report = build_sender_report(ssrc, rtp_timestamp, SystemTime::now());

    let bind_addr: SocketAddr = if dest.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    match UdpSocket::bind(bind_addr).and_then(|sock| sock.send_to(&report, dest)) {
        Ok(_) => {
            tracing::debug!(%dest, ssrc, rtp_timestamp, "sent first sender report");
        }
        Err(err) => {
            tracing::warn!(%dest, ssrc, %err, "sender report failed, continuing without sync anchor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fraction_half_second() {
        assert_eq!(ntp_fraction(500_000), 0x8000_0000);
    }

    #[test]
    fn fraction_endpoints() {
        assert_eq!(ntp_fraction(0), 0);
        // 999_999 us is just shy of a full turn of the fraction
        let f = ntp_fraction(999_999);
        assert!(f > 0xFFFF_E000);
    }

    #[test]
    fn fraction_quarter_second() {
        assert_eq!(ntp_fraction(250_000), 0x4000_0000);
    }

    #[test]
    fn report_layout() {
        let now = UNIX_EPOCH + Duration::new(1_000_000_000, 500_000_000);
        let buf = build_sender_report(0xDEAD_BEEF, 0x0102_0304, now);

        assert_eq!(buf.len(), SENDER_REPORT_LEN);
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], 200);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 6);
        assert_eq!(&buf[4..8], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(
            u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            1_000_000_000u32.wrapping_add(2_208_988_800)
        );
        assert_eq!(
            u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            0x8000_0000
        );
        assert_eq!(&buf[16..20], &0x0102_0304u32.to_be_bytes());
        assert_eq!(&buf[20..28], &[0u8; 8], "zero packet and octet counts");
    }

    #[test]
    fn rtcp_port_is_media_port_plus_one() {
        let media: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(rtcp_addr(media), "10.0.0.1:4001".parse().unwrap());
    }
}
