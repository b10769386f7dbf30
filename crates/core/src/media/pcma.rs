//! Fixed-size repacketization of encoded audio.
//!
//! Encoders hand back chunks sized by their own framing (or by the
//! resampler), not by the 20 ms cadence the wire wants. The
//! [`AudioRepacketizer`] re-slices that stream into exact `split_size`
//! packets, carrying any remainder across chunk boundaries.

use crate::error::{PlayoutError, Result};

/// Default packet size: 160 bytes = 20 ms of 8 kHz A-law.
pub const DEFAULT_SPLIT_SIZE: usize = 160;

/// Re-slices variably sized encoded-audio chunks into fixed-size
/// packets.
///
/// The residual is tracked with an explicit length. Encoded audio
/// legitimately contains zero bytes (A-law 0x00 is a valid sample), so
/// nothing here may treat the buffer as a terminated string.
///
/// Invariant: after every [`repack`](Self::repack) call the residual
/// holds strictly fewer than `split_size` bytes.
#[derive(Debug)]
pub struct AudioRepacketizer {
    split_size: usize,
    residual: Vec<u8>,
}

impl AudioRepacketizer {
    /// A zero `split_size` can never complete a packet, so it is
    /// rejected up front.
    pub fn new(split_size: usize) -> Result<Self> {
        if split_size == 0 {
            return Err(PlayoutError::InvalidSplitSize(split_size));
        }
        Ok(Self {
            split_size,
            residual: Vec::with_capacity(split_size),
        })
    }

    pub fn split_size(&self) -> usize {
        self.split_size
    }

    /// Bytes currently carried over from previous chunks.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }

    /// Append `chunk` to the carried residual and emit every complete
    /// `split_size` packet through `emit`. Returns the number of
    /// packets emitted.
    ///
    /// The first packet is stitched from the residual plus the chunk's
    /// head; later packets are sliced straight out of `chunk` without
    /// copying.
    pub fn repack<F>(&mut self, chunk: &[u8], mut emit: F) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut emitted = 0;
        let mut rest = chunk;

        if !self.residual.is_empty() {
            if self.residual.len() + rest.len() < self.split_size {
                self.residual.extend_from_slice(rest);
                return Ok(0);
            }
            let take = self.split_size - self.residual.len();
            self.residual.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            emit(&self.residual)?;
            emitted += 1;
            self.residual.clear();
        }

        while rest.len() >= self.split_size {
            emit(&rest[..self.split_size])?;
            emitted += 1;
            rest = &rest[self.split_size..];
        }

        self.residual.extend_from_slice(rest);
        tracing::trace!(
            chunk_bytes = chunk.len(),
            packets = emitted,
            residual = self.residual.len(),
            "audio chunk repacked"
        );
        Ok(emitted)
    }

    /// Emit the carried residual as a final, possibly short, packet.
    /// Called at end of stream.
    pub fn flush<F>(&mut self, mut emit: F) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if self.residual.is_empty() {
            return Ok(0);
        }
        emit(&self.residual)?;
        tracing::trace!(residual = self.residual.len(), "flushed final short packet");
        self.residual.clear();
        Ok(1)
    }
}

impl Default for AudioRepacketizer {
    fn default() -> Self {
        Self {
            split_size: DEFAULT_SPLIT_SIZE,
            residual: Vec::with_capacity(DEFAULT_SPLIT_SIZE),
        }
    }
}
