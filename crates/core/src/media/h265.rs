//! H.265 (HEVC) payloader — RFC 7798. Planned.
//!
//! Key differences from H.264 (RFC 6184):
//!
//! - **2-byte NAL unit header** (vs 1-byte in H.264).
//!   The NAL type is in bits 1..6 of the first byte.
//!
//! - **FU header format**: payload header with type 49, then a 1-byte
//!   FU header carrying a 6-bit NAL type plus start/end bits.
//!
//! ## Implementation plan
//!
//! Will follow the same pattern as [`super::h264::H264Payloader`]:
//! - Reuse [`super::annexb::NalUnits`] (same start codes, different
//!   header parsing).
//! - Same [`super::FrameSink`] emission contract, 90 kHz clock.
