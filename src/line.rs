use std::any::Any;
use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

/// Per-connection state threaded through every node of a chain
///
/// A [`Line`] is a cheap, cloneable handle (an [`Rc`] under the hood) to
/// shared connection state: a liveness flag, a reentrancy lock depth, a
/// flat per-node state arena sized at chain-build time, and the
/// cross-node `recalculate_checksum` channel IP-layer nodes use to tell
/// a downstream TUN device that a header was rewritten in place.
///
/// [`Line::lock`] returns a shared handle with an explicit borrow guard
/// that defers destruction until every outstanding guard is dropped,
/// rather than tearing the line down the instant a reentrant call
/// drops its own depth counter to zero. A node's event handler can call
/// [`Line::lock`], iterate
/// over a batch of buffered packets forwarding each one upstream (which
/// may re-enter and call [`Line::finish`] on this same line), and check
/// [`Line::is_alive`] after every forward — the line is only actually
/// torn down once the guard (and every other outstanding guard) has been
/// dropped.
#[derive(Clone)]
pub struct Line {
    shared: Rc<LineShared>,
}

struct LineShared {
    alive: Cell<bool>,
    lock_depth: Cell<usize>,
    recalculate_checksum: Cell<bool>,
    slots: Vec<RefCell<Option<Box<dyn Any>>>>,
}

impl Line {
    /// Create a new line with `slot_count` per-node state slots — one
    /// per node in the chain this line belongs to, allocated by the
    /// chain builder. A freshly created line is alive and unlocked.
    pub fn new(slot_count: usize) -> Line {
        Line {
            shared: Rc::new(LineShared {
                alive: Cell::new(true),
                lock_depth: Cell::new(0),
                recalculate_checksum: Cell::new(false),
                slots: (0..slot_count).map(|_| RefCell::new(None)).collect(),
            }),
        }
    }

    /// True until a `finish` event has propagated through the chain in
    /// at least one direction.
    #[inline(always)]
    pub fn is_alive(&self) -> bool {
        self.shared.alive.get()
    }

    /// Number of outstanding [`LineLock`] guards.
    #[inline(always)]
    pub fn lock_depth(&self) -> usize {
        self.shared.lock_depth.get()
    }

    /// Raise the lock depth and return a guard that lowers it again on
    /// drop. While any guard is outstanding, destruction triggered by
    /// [`Line::finish`] is deferred. Safe to call from within an event
    /// dispatch, including re-entrantly.
    pub fn lock(&self) -> LineLock<'_> {
        self.shared.lock_depth.set(self.shared.lock_depth.get() + 1);
        LineLock { line: self }
    }

    /// Mark the line as no longer alive. If no [`LineLock`] guard is
    /// currently outstanding, the per-node state arena is released
    /// immediately; otherwise release is deferred until the last guard
    /// is dropped. Idempotent.
    pub fn finish(&self) {
        self.shared.alive.set(false);
        self.maybe_destroy();
    }

    /// Get mutable access to this node's slot, initializing it with
    /// `init` on first access. `slot` is the node's offset into the
    /// line's state arena, assigned by the chain builder.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range for the arena this line was
    /// built with, or if a previous access initialized the slot with a
    /// different type `T`.
    pub fn state<T: 'static>(&self, slot: usize, init: impl FnOnce() -> T) -> RefMut<'_, T> {
        let cell = self
            .shared
            .slots
            .get(slot)
            .unwrap_or_else(|| panic_bad_slot(slot));
        let mut guard = cell.borrow_mut();
        if guard.is_none() {
            *guard = Some(Box::new(init()));
        }
        RefMut::map(guard, |opt| {
            opt.as_mut()
                .unwrap()
                .downcast_mut::<T>()
                .expect("Line::state: node state type mismatch for this slot")
        })
    }

    /// Read the `recalculate_checksum` flag set by an upstream IP-layer
    /// node for a downstream consumer (typically a TUN device) to read.
    #[inline(always)]
    pub fn recalculate_checksum(&self) -> bool {
        self.shared.recalculate_checksum.get()
    }

    /// Set the `recalculate_checksum` flag. Kept as a single boolean on
    /// the line rather than threaded explicitly between nodes — callers
    /// should reset it after consuming it so the coupling stays visible
    /// only at the point of use.
    #[inline(always)]
    pub fn set_recalculate_checksum(&self, value: bool) {
        self.shared.recalculate_checksum.set(value);
    }

    fn maybe_destroy(&self) {
        if !self.shared.alive.get() && self.shared.lock_depth.get() == 0 {
            for slot in &self.shared.slots {
                *slot.borrow_mut() = None;
            }
        }
    }
}

/// RAII guard returned by [`Line::lock`]
///
/// Dropping the guard lowers the line's lock depth; if the line has
/// already been marked not-alive and no other guard remains
/// outstanding, the per-node state arena is released at that point.
pub struct LineLock<'a> {
    line: &'a Line,
}

impl Drop for LineLock<'_> {
    fn drop(&mut self) {
        let depth = self.line.shared.lock_depth.get();
        debug_assert!(depth > 0, "LineLock dropped with lock_depth already zero");
        self.line.shared.lock_depth.set(depth - 1);
        self.line.maybe_destroy();
    }
}

#[inline(never)]
#[cold]
fn panic_bad_slot(slot: usize) -> ! {
    panic!("Line::state: slot {slot} out of range for this line's state arena");
}
