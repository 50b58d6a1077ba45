use std::collections::VecDeque;

use crate::sbuf::Sbuf;

/// FIFO of [`Sbuf`] chunks presenting a contiguous readable byte stream
///
/// A [`BufferStream`] is the per-line state a framing or multiplexing
/// node keeps between calls: inbound chunks arrive in whatever sizes
/// the transport delivered them in, and [`BufferStream::read_exact`]
/// lets the node pull out exactly the number of bytes a parsed frame
/// header says it needs, regardless of how many input chunks that
/// spans. [`BufferStream::push`] never copies — the pushed [`Sbuf`] is
/// stored as-is and only copied out again if a [`BufferStream::read_exact`]
/// call has to gather bytes across more than one chunk.
///
/// Every [`Sbuf`] produced by [`BufferStream::read_exact`] carries the
/// left padding the stream was constructed with, so a node can
/// immediately [`Sbuf::shift_left`] into it to add its own header
/// without reallocating.
pub struct BufferStream {
    chunks: VecDeque<Sbuf>,
    head_offset: usize,
    len: usize,
    left_padding: usize,
}

impl BufferStream {
    /// Create an empty stream. `left_padding` is the left reservation
    /// that [`BufferStream::read_exact`] will give every [`Sbuf`] it
    /// produces — normally the chain's maximum declared
    /// `required_padding_left`.
    pub fn new(left_padding: usize) -> BufferStream {
        BufferStream {
            chunks: VecDeque::new(),
            head_offset: 0,
            len: 0,
            left_padding,
        }
    }

    /// Total number of readable bytes currently buffered.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if there are no readable bytes buffered.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a chunk to the back of the stream, taking ownership.
    pub fn push(&mut self, buf: Sbuf) {
        self.len += buf.length();
        if buf.length() > 0 {
            self.chunks.push_back(buf);
        }
    }

    /// Discard all buffered data without reading it, e.g. as the
    /// framing node's overflow policy.
    pub fn empty(&mut self) {
        self.chunks.clear();
        self.head_offset = 0;
        self.len = 0;
    }

    /// Copy `n` bytes starting at `offset` into `dst` without consuming
    /// them from the stream. `dst` must be at least `n` bytes long.
    ///
    /// # Panics
    ///
    /// Panics if `offset + n` exceeds [`BufferStream::len`], or if
    /// `dst` is shorter than `n`.
    pub fn view_bytes_at(&self, offset: usize, dst: &mut [u8], n: usize) {
        assert!(
            offset + n <= self.len,
            "view_bytes_at: requested range exceeds buffered length"
        );
        assert!(dst.len() >= n, "view_bytes_at: destination too small");

        let mut remaining_skip = self.head_offset + offset;
        let mut written = 0;
        for chunk in self.chunks.iter() {
            let chunk_view = chunk.view();
            if remaining_skip >= chunk_view.len() {
                remaining_skip -= chunk_view.len();
                continue;
            }
            let available = chunk_view.len() - remaining_skip;
            let take = available.min(n - written);
            dst[written..written + take]
                .copy_from_slice(&chunk_view[remaining_skip..remaining_skip + take]);
            written += take;
            remaining_skip = 0;
            if written == n {
                break;
            }
        }
    }

    /// Consume and return exactly `n` bytes as a new [`Sbuf`], or
    /// `None` if fewer than `n` bytes are currently buffered (no
    /// partial reads). The returned buffer's left reservation is at
    /// least the `left_padding` this stream was constructed with.
    pub fn read_exact(&mut self, n: usize) -> Option<Sbuf> {
        if n > self.len {
            return None;
        }

        let mut out = Sbuf::allocate(self.left_padding + n, self.left_padding);
        let mut remaining = n;
        while remaining > 0 {
            let front_len = self.chunks.front().unwrap().view().len() - self.head_offset;
            let take = front_len.min(remaining);
            {
                let front = self.chunks.front().unwrap();
                out.append(&front.view()[self.head_offset..self.head_offset + take]);
            }
            self.head_offset += take;
            remaining -= take;

            if self.head_offset == self.chunks.front().unwrap().view().len() {
                self.chunks.pop_front();
                self.head_offset = 0;
            }
        }
        self.len -= n;
        Some(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_len() {
        let mut s = BufferStream::new(0);
        assert!(s.is_empty());
        s.push(Sbuf::from_slice(b"AB"));
        s.push(Sbuf::from_slice(b"CDE"));
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn view_bytes_at_gathers_across_chunks() {
        let mut s = BufferStream::new(0);
        s.push(Sbuf::from_slice(b"\xAA\xBB"));
        s.push(Sbuf::from_slice(b"\xCC\xDD\xEE"));
        let mut dst = [0u8; 3];
        s.view_bytes_at(1, &mut dst, 3);
        assert_eq!(dst, [0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn read_exact_round_trips_and_consumes() {
        let mut s = BufferStream::new(0);
        s.push(Sbuf::from_slice(b"\xAA\xBB"));
        s.push(Sbuf::from_slice(b"\xCC\xDD\xEE"));
        let out = s.read_exact(4).unwrap();
        assert_eq!(out.view(), [0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn read_exact_returns_none_on_partial_data() {
        let mut s = BufferStream::new(0);
        s.push(Sbuf::from_slice(b"AB"));
        assert!(s.read_exact(3).is_none());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn read_exact_preserves_left_padding() {
        let mut s = BufferStream::new(8);
        s.push(Sbuf::from_slice(b"hello"));
        let out = s.read_exact(5).unwrap();
        assert_eq!(out.reserved_left(), 8);
        assert_eq!(out.view(), b"hello");
    }

    #[test]
    fn empty_discards_everything() {
        let mut s = BufferStream::new(0);
        s.push(Sbuf::from_slice(b"stale"));
        s.empty();
        assert!(s.is_empty());
        assert_eq!(s.read_exact(0).unwrap().length(), 0);
    }

    #[test]
    fn zero_length_push_is_a_noop() {
        let mut s = BufferStream::new(0);
        s.push(Sbuf::allocate(4, 0));
        assert!(s.is_empty());
    }
}
