//! Rolling weak checksum over a sliding window
//!
//! Adler-style two-component sum: `s1` is the byte sum, `s2` the
//! position-weighted sum, each offset by a constant so runs of zero bytes
//! still produce distinct values. The value combines both halves into a
//! `u32`. Cheap to roll one byte at a time, which is what makes scanning a
//! base file at every offset affordable; matches are always confirmed with
//! the strong hash before being trusted.

const CHAR_OFFSET: u32 = 31;

/// Incremental weak checksum over a window of fixed length.
#[derive(Debug, Clone)]
pub struct RollingSum {
    s1: u32,
    s2: u32,
    len: u32,
}

impl RollingSum {
    /// Sum over an initial window.
    #[must_use]
    pub fn new(window: &[u8]) -> Self {
        let len = window.len() as u32;
        let mut s1: u32 = 0;
        let mut s2: u32 = 0;
        for (i, &b) in window.iter().enumerate() {
            let v = u32::from(b) + CHAR_OFFSET;
            s1 = s1.wrapping_add(v);
            s2 = s2.wrapping_add(v.wrapping_mul(len - i as u32));
        }
        Self { s1, s2, len }
    }

    /// Slide the window one byte: drop `out`, append `inc`.
    pub fn roll(&mut self, out: u8, inc: u8) {
        let out_v = u32::from(out) + CHAR_OFFSET;
        let in_v = u32::from(inc) + CHAR_OFFSET;
        self.s1 = self.s1.wrapping_sub(out_v).wrapping_add(in_v);
        self.s2 = self
            .s2
            .wrapping_sub(self.len.wrapping_mul(out_v))
            .wrapping_add(self.s1);
    }

    /// Current checksum value.
    #[must_use]
    pub fn value(&self) -> u32 {
        (self.s1 & 0xffff) | (self.s2 << 16)
    }
}

/// One-shot weak checksum of a block.
#[must_use]
pub fn weak_sum(block: &[u8]) -> u32 {
    RollingSum::new(block).value()
}
