/// Fixed header size for a frame: [u64 seq][u32 len][u32 crc]
pub const FRAME_HEADER_SIZE: usize = 16;

/// Frame `payload` under sequence number `seq` and append it to `out`.
pub fn encode_frame(out: &mut Vec<u8>, seq: u64, payload: &[u8]) {
    let len = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(payload);
}

/// A frame borrowed from a log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub seq: u64,
    pub payload: &'a [u8],
}

/// Iterates complete, CRC-valid frames from the start of a buffer.
///
/// Stops at the first partial frame or CRC mismatch; `safe_len()` then reports the
/// largest prefix that ends exactly on a good frame.
pub struct FrameIter<'a> {
    buf: &'a [u8],
    idx: usize,
    done: bool,
}

impl<'a> FrameIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            idx: 0,
            done: false,
        }
    }

    pub fn safe_len(&self) -> usize {
        self.idx
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let header = self.buf.get(self.idx..self.idx + FRAME_HEADER_SIZE)?;
        let seq = u64::from_le_bytes(header[0..8].try_into().ok()?);
        let len = u32::from_le_bytes(header[8..12].try_into().ok()?) as usize;
        let crc = u32::from_le_bytes(header[12..16].try_into().ok()?);

        let start = self.idx + FRAME_HEADER_SIZE;
        let payload = match self.buf.get(start..start + len) {
            Some(p) => p,
            None => {
                self.done = true;
                return None;
            }
        };
        if crc32fast::hash(payload) != crc {
            self.done = true;
            return None;
        }
        self.idx = start + len;
        Some(Frame { seq, payload })
    }
}
