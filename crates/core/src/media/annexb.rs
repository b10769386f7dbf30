//! Annex B start-code scanning.
//!
//! H.264 Annex B bitstreams delimit NAL units with `00 00 01` start
//! codes, optionally preceded by an extra `00` (the 4-byte form). The
//! scanner locates boundaries without allocating; [`NalUnits`] iterates
//! the NAL payloads between them.

/// Position of the next `00 00 01` sequence at or after `from`, with a
/// preceding zero byte folded in so 3-byte and 4-byte start codes are
/// equivalent. Returns `data.len()` when no start code remains.
pub fn find_start_code(data: &[u8], from: usize) -> usize {
    let pos = find_start_code_inner(data, from);
    if pos > from && pos < data.len() && data[pos - 1] == 0 {
        pos - 1
    } else {
        pos
    }
}

/// Byte-exact scan for `00 00 01`, inspecting four bytes at a time.
///
/// The word filter `(w - 0x01010101) & !w & 0x80808080` is non-zero
/// only when the window contains a byte \<= 1, so windows of ordinary
/// coded data are skipped with one comparison. Positions flagged by
/// the filter are re-checked bytewise, keeping the result identical to
/// a naive scan.
fn find_start_code_inner(data: &[u8], from: usize) -> usize {
    let n = data.len();
    if n < 3 {
        return n;
    }
    let mut i = from;

    while i + 8 <= n {
        let w = u32::from_ne_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        if (w.wrapping_sub(0x0101_0101) & !w & 0x8080_8080) != 0 {
            for j in i..i + 4 {
                if data[j] == 0 && data[j + 1] == 0 && data[j + 2] == 1 {
                    return j;
                }
            }
        }
        i += 4;
    }

    while i + 2 < n {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            return i;
        }
        i += 1;
    }
    n
}

/// Iterator over the NAL units of an Annex B buffer.
///
/// Yields each non-empty NAL payload (header byte included, start code
/// excluded) as a borrowed slice. Bytes before the first start code are
/// skipped.
#[derive(Debug)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NalUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let pos = find_start_code(data, 0);
        Self { data, pos }
    }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            if self.pos >= self.data.len() {
                return None;
            }
            // Skip the start code: leading zeros, then the 0x01.
            let mut start = self.pos;
            while start < self.data.len() && self.data[start] == 0 {
                start += 1;
            }
            start += 1;
            if start >= self.data.len() {
                self.pos = self.data.len();
                return None;
            }
            let end = find_start_code(self.data, start);
            self.pos = end;
            if start < end {
                return Some(&self.data[start..end]);
            }
        }
    }
}
