//! Fixed-size buffers backing a socket record.
//!
//! `RingBuffer` is the in-buffer: a circular ring with one sacrificed slot
//! so `write+1 == read` unambiguously means full — do not replace this
//! with a separate length counter. `LinearBuffer` is the out-buffer: a
//! linear fill region drained by `memmove` on partial send.

/// Default capacity for both buffers when a record doesn't override it.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Circular read buffer. `capacity()` is `data.len()`; one byte is always
/// sacrificed, so at most `capacity() - 1` bytes are ever buffered.
pub struct RingBuffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        // capacity + 1 so callers asking for "holds up to N bytes" get N,
        // with the sacrificed slot invisible to them.
        RingBuffer { data: vec![0u8; capacity + 1], read: 0, write: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        (self.write + self.capacity() - self.read) % self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// The contiguous write-side free region length: the distance from
    /// the write cursor to the end of the buffer when the write cursor is
    /// at or past the read cursor, otherwise the gap up to (but not
    /// touching) the read cursor.
    pub fn contiguous_free(&self) -> usize {
        if self.write >= self.read {
            self.capacity() - self.write
        } else {
            self.read - self.write - 1
        }
    }

    /// The contiguous slice at the write cursor, of length
    /// `min(contiguous_free(), want)`.
    pub fn write_slice(&mut self, want: usize) -> &mut [u8] {
        let len = self.contiguous_free().min(want);
        &mut self.data[self.write..self.write + len]
    }

    /// Advances the write cursor by `n`, wrapping to 0 at capacity.
    pub fn advance_write(&mut self, n: usize) {
        self.write += n;
        if self.write == self.capacity() {
            self.write = 0;
        }
    }

    /// Drains up to `out.len()` buffered bytes into `out`, handling wrap.
    /// Returns the number of bytes copied.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let want = out.len().min(self.buffered());
        let mut copied = 0;
        while copied < want {
            let contiguous = if self.write >= self.read {
                self.write - self.read
            } else {
                self.capacity() - self.read
            };
            let chunk = contiguous.min(want - copied);
            if chunk == 0 {
                break;
            }
            out[copied..copied + chunk].copy_from_slice(&self.data[self.read..self.read + chunk]);
            self.read += chunk;
            if self.read == self.capacity() {
                self.read = 0;
            }
            copied += chunk;
        }
        copied
    }
}

/// Linear write buffer, drained by `memmove` on partial send.
pub struct LinearBuffer {
    data: Vec<u8>,
    fill: usize,
}

impl LinearBuffer {
    pub fn new(capacity: usize) -> Self {
        LinearBuffer { data: vec![0u8; capacity], fill: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.fill
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.fill
    }

    /// Appends as much of `buf` as fits, returning the number of bytes
    /// copied in.
    pub fn push(&mut self, buf: &[u8]) -> usize {
        let n = self.free().min(buf.len());
        self.data[self.fill..self.fill + n].copy_from_slice(&buf[..n]);
        self.fill += n;
        n
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.fill]
    }

    /// Removes the first `n` sent bytes, `memmove`-ing the unsent tail to
    /// the buffer origin.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.fill);
        self.data.copy_within(n..self.fill, 0);
        self.fill -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_sacrifices_one_slot() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.capacity(), 5);
        let slice = ring.write_slice(8);
        assert_eq!(slice.len(), 4);
        slice.copy_from_slice(b"abcd");
        ring.advance_write(4);
        assert_eq!(ring.buffered(), 4);
        assert_eq!(ring.contiguous_free(), 0);
    }

    #[test]
    fn ring_buffer_wraps() {
        let mut ring = RingBuffer::new(4);
        ring.write_slice(4).copy_from_slice(b"abcd");
        ring.advance_write(4);
        let mut out = [0u8; 2];
        assert_eq!(ring.drain_into(&mut out), 2);
        assert_eq!(&out, b"ab");
        // Wrapped write region is now available at the front.
        let slice = ring.write_slice(2);
        assert_eq!(slice.len(), 2);
        slice.copy_from_slice(b"ef");
        ring.advance_write(2);
        let mut out = [0u8; 4];
        assert_eq!(ring.drain_into(&mut out), 4);
        assert_eq!(&out, b"cdef");
    }

    #[test]
    fn linear_buffer_consume_memmoves_tail() {
        let mut lin = LinearBuffer::new(8);
        assert_eq!(lin.push(b"abcdef"), 6);
        lin.consume(4);
        assert_eq!(lin.as_slice(), b"ef");
        assert_eq!(lin.free(), 6);
    }
}
