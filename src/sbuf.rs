use std::rc::Rc;

/// Owned, reference-counted, shiftable byte buffer
///
/// An [`Sbuf`] is backed by a single contiguous allocation split into
/// three regions: bytes already consumed from the front and reserved
/// for future prepends (`reserved_left`), the logical payload
/// (`length`), and free space at the back reserved for appends
/// (`reserved_right`). Nodes that need to prepend a header (a length
/// prefix, a multiplexer frame header) call [`Sbuf::shift_left`] to
/// grow the payload into the left reservation without reallocating or
/// copying the existing bytes; nodes that strip a header call
/// [`Sbuf::shift_right`] to shrink it from the front.
///
/// Transferring an [`Sbuf`] into a forwarding call transfers ownership
/// to the callee, exactly like moving any other
/// Rust value. The one exception the engine's contract allows is a
/// producer retaining a copy of the bytes to replay on retransmit: call
/// [`Sbuf::retain`] before handing the original off, which clones the
/// [`Rc`] rather than the bytes. Because the backing storage is then
/// shared, any node that needs to mutate a buffer that might have been
/// retained calls a mutating method as normal — [`Sbuf`] uses
/// copy-on-write internally (via [`Rc::make_mut`]), so the clone only
/// pays for a real copy if the storage actually turned out to be
/// shared, and the retained copy is never silently corrupted by a
/// downstream in-place rewrite.
///
/// Invariant: for every [`Sbuf`] passed to an event, `reserved_left` is
/// at least the chain's maximum declared `required_padding_left`
/// (enforced by the chain's head allocation, not by this type).
pub struct Sbuf {
    data: Rc<Vec<u8>>,
    pos: usize,
    len: usize,
}

impl Sbuf {
    /// Allocate a new buffer with `capacity` bytes of backing storage,
    /// `left_reserve` bytes of which are held as the initial
    /// `reserved_left` region. The returned buffer has `length() == 0`.
    ///
    /// # Panics
    ///
    /// Panics if `left_reserve > capacity`.
    pub fn allocate(capacity: usize, left_reserve: usize) -> Sbuf {
        assert!(
            left_reserve <= capacity,
            "left_reserve ({left_reserve}) exceeds capacity ({capacity})"
        );
        Sbuf {
            data: Rc::new(vec![0; capacity]),
            pos: left_reserve,
            len: 0,
        }
    }

    /// Build a buffer directly from a byte slice, with no left
    /// reservation and no spare right capacity. Used by reference nodes
    /// and tests to construct payloads inline; chain-head allocation
    /// should prefer [`Sbuf::allocate`] followed by [`Sbuf::append`] so
    /// that the chain's required left padding is honored.
    pub fn from_slice(bytes: &[u8]) -> Sbuf {
        Sbuf {
            data: Rc::new(bytes.to_vec()),
            pos: 0,
            len: bytes.len(),
        }
    }

    /// Number of readable bytes currently held.
    #[inline(always)]
    pub fn length(&self) -> usize {
        self.len
    }

    /// Bytes of unused capacity before the payload, available to
    /// [`Sbuf::shift_left`].
    #[inline(always)]
    pub fn reserved_left(&self) -> usize {
        self.pos
    }

    /// Bytes of unused capacity after the payload, available to
    /// [`Sbuf::append`].
    #[inline(always)]
    pub fn reserved_right(&self) -> usize {
        self.data.len() - self.pos - self.len
    }

    /// Expose `n` bytes that were sitting in the left reservation,
    /// growing the payload leftward. Used to write a header into
    /// pre-reserved space without copying the payload.
    ///
    /// # Panics
    ///
    /// Panics if `n > reserved_left()`.
    #[track_caller]
    pub fn shift_left(&mut self, n: usize) {
        if n > self.pos {
            panic_shift_left_overflow();
        }
        self.pos -= n;
        self.len += n;
    }

    /// Consume `n` bytes from the front of the payload, e.g. to strip
    /// a header once it has been parsed.
    ///
    /// # Panics
    ///
    /// Panics if `n > length()`.
    #[track_caller]
    pub fn shift_right(&mut self, n: usize) {
        if n > self.len {
            panic_shift_right_overflow();
        }
        self.pos += n;
        self.len -= n;
    }

    /// Append `src` to the end of the payload, consuming from the
    /// right reservation.
    ///
    /// # Panics
    ///
    /// Panics if `src.len() > reserved_right()`.
    #[track_caller]
    pub fn append(&mut self, src: &[u8]) {
        if src.len() > self.reserved_right() {
            panic_append_overflow();
        }
        let start = self.pos + self.len;
        let end = start + src.len();
        Rc::make_mut(&mut self.data)[start..end].copy_from_slice(src);
        self.len += src.len();
    }

    /// Read-only view of the payload.
    #[inline(always)]
    pub fn view(&self) -> &[u8] {
        &self.data[self.pos..self.pos + self.len]
    }

    /// Mutable view of the payload, e.g. for in-place header rewriting
    /// by an IP-layer node. Copy-on-write: if this [`Sbuf`] shares its
    /// backing storage with a retained copy, the first mutable access
    /// clones the storage so the retained copy is unaffected.
    #[inline(always)]
    pub fn mutable_view(&mut self) -> &mut [u8] {
        let pos = self.pos;
        let len = self.len;
        &mut Rc::make_mut(&mut self.data)[pos..pos + len]
    }

    /// Bump the reference count on the backing storage and return a new
    /// handle with the same cursor, for a producer that needs to keep a
    /// copy around for retransmit after handing the original off
    /// downstream. See the type-level docs for the copy-on-write
    /// caveat.
    pub fn retain(&self) -> Sbuf {
        self.clone()
    }

    /// Drop this handle, decrementing the backing storage's reference
    /// count. Equivalent to letting the value go out of scope; provided
    /// as a named call for symmetry with [`Sbuf::retain`].
    pub fn release(self) {
        drop(self)
    }
}

impl Clone for Sbuf {
    fn clone(&self) -> Sbuf {
        Sbuf {
            data: Rc::clone(&self.data),
            pos: self.pos,
            len: self.len,
        }
    }
}

#[inline(never)]
#[cold]
#[track_caller]
fn panic_shift_left_overflow() -> ! {
    panic!("Sbuf::shift_left: not enough reserved_left space");
}

#[inline(never)]
#[cold]
#[track_caller]
fn panic_shift_right_overflow() -> ! {
    panic!("Sbuf::shift_right: not enough bytes to consume");
}

#[inline(never)]
#[cold]
#[track_caller]
fn panic_append_overflow() -> ! {
    panic!("Sbuf::append: not enough reserved_right space");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocate_starts_empty() {
        let b = Sbuf::allocate(16, 4);
        assert_eq!(b.length(), 0);
        assert_eq!(b.reserved_left(), 4);
        assert_eq!(b.reserved_right(), 12);
    }

    #[test]
    fn append_consumes_right_reservation() {
        let mut b = Sbuf::allocate(16, 4);
        b.append(b"hello");
        assert_eq!(b.view(), b"hello");
        assert_eq!(b.reserved_right(), 7);
    }

    #[test]
    fn shift_left_then_shift_right_is_identity() {
        let mut b = Sbuf::allocate(16, 4);
        b.append(b"data");
        b.mutable_view()[..4].copy_from_slice(b"data");
        let before = b.view().to_vec();
        b.shift_left(4);
        b.mutable_view()[..4].copy_from_slice(&[0xAA; 4]);
        b.shift_right(4);
        assert_eq!(b.view(), &before[..]);
    }

    #[test]
    fn shift_left_exposes_prepended_header() {
        let mut b = Sbuf::allocate(16, 2);
        b.append(b"XY");
        b.shift_left(2);
        b.mutable_view()[..2].copy_from_slice(b"HD");
        assert_eq!(b.view(), b"HDXY");
    }

    #[test]
    #[should_panic]
    fn shift_left_beyond_reservation_panics() {
        let mut b = Sbuf::allocate(16, 2);
        b.shift_left(3);
    }

    #[test]
    #[should_panic]
    fn shift_right_beyond_length_panics() {
        let mut b = Sbuf::allocate(16, 2);
        b.append(b"x");
        b.shift_right(2);
    }

    #[test]
    #[should_panic]
    fn append_beyond_capacity_panics() {
        let mut b = Sbuf::allocate(4, 0);
        b.append(b"toolong");
    }

    #[test]
    fn retain_shares_storage_until_mutated() {
        let mut original = Sbuf::allocate(16, 0);
        original.append(b"abc");
        let retained = original.retain();
        assert_eq!(retained.view(), b"abc");

        // Mutating the original clones on write, so the retained copy
        // is unaffected.
        original.mutable_view()[0] = b'Z';
        assert_eq!(original.view(), b"Zbc");
        assert_eq!(retained.view(), b"abc");
    }

    #[test]
    fn from_slice_has_no_spare_capacity() {
        let b = Sbuf::from_slice(b"payload");
        assert_eq!(b.length(), 7);
        assert_eq!(b.reserved_left(), 0);
        assert_eq!(b.reserved_right(), 0);
    }
}
