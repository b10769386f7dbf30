//! Reference frame-sink implementations.
//!
//! The core hands finished payloads to a [`FrameSink`](crate::media::FrameSink);
//! a host runtime usually supplies its own. [`udp::UdpFrameSink`] is the
//! reference sink: it wraps each payload in an RTP fixed header
//! ([`rtp::RtpHeader`]) and sends it over UDP.

pub mod rtp;
pub mod udp;

pub use rtp::RtpHeader;
pub use udp::UdpFrameSink;
