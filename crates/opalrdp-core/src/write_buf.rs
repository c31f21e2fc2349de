use core::ops::{Index, Range, RangeFrom, RangeFull, RangeTo};

/// Keep at most this much capacity around when the buffer is cleared.
const MAX_CAPACITY_WHEN_CLEARED: usize = 16384;

/// Growable output buffer tracking a filled region.
///
/// ```not_rust
/// [          Vec capacity             ]
/// [ filled | unfilled |               ]
/// [    initialized    | uninitialized ]
/// ```
#[derive(Debug, Default)]
pub struct WriteBuf {
    inner: Vec<u8>,
    filled: usize,
}

impl WriteBuf {
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: Vec::new(),
            filled: 0,
        }
    }

    /// Length of the filled region.
    #[inline]
    pub const fn filled_len(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// The filled portion of the buffer.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.inner[..self.filled]
    }

    /// Ensures the initialized, unfilled portion can hold `additional` more bytes.
    #[inline]
    pub fn initialize(&mut self, additional: usize) {
        if self.inner.len() < self.filled + additional {
            self.inner.resize(self.filled + additional, 0);
        }
    }

    /// A mutable view over the first `n` unfilled bytes, allocating as necessary.
    #[inline]
    pub fn unfilled_to(&mut self, n: usize) -> &mut [u8] {
        self.initialize(n);
        &mut self.inner[self.filled..self.filled + n]
    }

    /// Marks `n` additional bytes as filled.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.filled += n;
    }

    #[inline]
    pub fn write_slice(&mut self, slice: &[u8]) {
        let n = slice.len();
        self.initialize(n);
        self.inner[self.filled..self.filled + n].copy_from_slice(slice);
        self.filled += n;
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.write_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn clear(&mut self) {
        if self.inner.len() > MAX_CAPACITY_WHEN_CLEARED {
            self.inner.truncate(MAX_CAPACITY_WHEN_CLEARED);
            self.inner.shrink_to_fit();
        }
        self.filled = 0;
    }
}

impl Index<Range<usize>> for WriteBuf {
    type Output = [u8];

    fn index(&self, index: Range<usize>) -> &Self::Output {
        &self.filled()[index]
    }
}

impl Index<RangeFrom<usize>> for WriteBuf {
    type Output = [u8];

    fn index(&self, index: RangeFrom<usize>) -> &Self::Output {
        &self.filled()[index]
    }
}

impl Index<RangeTo<usize>> for WriteBuf {
    type Output = [u8];

    fn index(&self, index: RangeTo<usize>) -> &Self::Output {
        &self.filled()[index]
    }
}

impl Index<RangeFull> for WriteBuf {
    type Output = [u8];

    fn index(&self, _: RangeFull) -> &Self::Output {
        self.filled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_region_grows_with_writes() {
        let mut buf = WriteBuf::new();
        assert!(buf.is_empty());

        buf.write_slice(&[1, 2, 3]);
        buf.write_u8(4);

        assert_eq!(buf.filled(), &[1, 2, 3, 4]);
        assert_eq!(buf.filled_len(), 4);
        assert_eq!(&buf[1..3], &[2, 3]);
    }

    #[test]
    fn unfilled_to_then_advance() {
        let mut buf = WriteBuf::new();
        buf.unfilled_to(4).copy_from_slice(&[9, 9, 9, 9]);
        buf.advance(4);
        assert_eq!(buf.filled(), &[9, 9, 9, 9]);

        buf.clear();
        assert!(buf.is_empty());
    }
}
