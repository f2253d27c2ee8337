//! Fixed-capacity byte buffers with a read/write cursor, used for both the
//! receive and transmit sides of [`crate::transp::Transp`].
//!
//! Mirrors the `{buf, pos, size}` shape used throughout the original's
//! `ser_s`/`transp_s` structs, backed by a `Vec<u8>` with a fixed capacity
//! rather than a raw fixed-size C array.

/// A byte buffer with a bounded capacity and a cursor.
///
/// For a receive buffer, `size` is how many bytes have been appended and
/// `pos` is the decode read cursor. For a transmit buffer, `size` is the
/// total frame length and `pos` is the drain write cursor. In both cases
/// the invariant `0 <= pos <= size <= capacity` holds.
#[derive(Debug, Clone)]
pub struct FrameBuf {
    buf: Vec<u8>,
    capacity: usize,
    pos: usize,
}

impl FrameBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        FrameBuf {
            buf: Vec::with_capacity(capacity),
            capacity,
            pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes currently held (append length, not capacity).
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Clears the buffer and resets the cursor. Used on `Idle -> Active`
    /// transitions, where the first byte of a new frame starts a fresh buffer.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    /// Appends bytes up to remaining capacity, silently truncating any
    /// overflow — a frame that overruns the buffer is recovered on the next
    /// frame boundary rather than treated as fatal.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        let room = self.capacity.saturating_sub(self.buf.len());
        let take = room.min(bytes.len());
        self.buf.extend_from_slice(&bytes[..take]);
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Loads a fresh outgoing frame, replacing any prior contents and
    /// resetting the drain cursor to zero.
    pub fn load(&mut self, bytes: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(&bytes[..bytes.len().min(self.capacity)]);
        self.pos = 0;
    }

    /// The yet-undrained tail, without advancing `pos`. Callers that hand
    /// this to an I/O write must call [`FrameBuf::advance`] with however
    /// many bytes the write actually accepted — the cursor must never move
    /// past what was confirmed written.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Advances the drain cursor by `n` bytes actually consumed (clamped to
    /// what remains).
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    pub fn is_drained(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_truncates_silently_on_overflow() {
        let mut b = FrameBuf::with_capacity(4);
        b.push_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
        assert!(b.is_full());
    }

    #[test]
    fn reset_clears_buffer_and_cursor() {
        let mut b = FrameBuf::with_capacity(8);
        b.push_slice(&[1, 2, 3]);
        b.reset();
        assert_eq!(b.size(), 0);
        assert_eq!(b.pos(), 0);
    }

    #[test]
    fn advance_moves_cursor_until_exhausted() {
        let mut b = FrameBuf::with_capacity(8);
        b.load(&[10, 20, 30]);
        assert_eq!(b.remaining(), &[10, 20, 30]);
        b.advance(2);
        assert_eq!(b.remaining(), &[30]);
        assert!(!b.is_drained());
        b.advance(1);
        assert!(b.is_drained());
    }

    #[test]
    fn advance_clamps_past_end() {
        let mut b = FrameBuf::with_capacity(8);
        b.load(&[10, 20]);
        b.advance(100);
        assert!(b.is_drained());
        assert_eq!(b.remaining(), &[] as &[u8]);
    }
}
