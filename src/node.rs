use crate::chain::Chain;
use crate::line::Line;
use crate::sbuf::Sbuf;

/// A node's position in its chain, assigned by the chain builder
///
/// Opaque outside this crate's engine modules; a node implementation
/// never constructs one itself, it only receives one back through
/// [`NodeContext`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct NodeId(pub(crate) usize);

/// The bidirectional event protocol every node in a chain implements
///
/// Ten callbacks: `establish`/`payload`/`finish`/`pause`/`resume`, each
/// in the upstream direction (head toward tail, the direction data
/// arriving from a client travels) and the downstream direction (tail
/// toward head, the direction a response travels).
///
/// Every method has a default implementation that forwards unchanged to
/// the next node in the event's direction, via [`NodeContext`]'s
/// `forward_*` helpers. A pass-through node (one that only inspects
/// traffic, or only cares about one event) needs to override nothing
/// but the handful of callbacks it actually acts on — most nodes in a
/// typical chain are one-liners that forward a buffer unchanged, and
/// only a few (a framing or rewriting node's `payload` handlers)
/// contain real logic.
pub trait TunnelNode {
    fn upstream_establish(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_upstream_establish(line);
    }

    fn upstream_payload(&self, ctx: &NodeContext, line: &Line, buf: Sbuf) {
        ctx.forward_upstream_payload(line, buf);
    }

    fn upstream_finish(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_upstream_finish(line);
    }

    fn upstream_pause(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_upstream_pause(line);
    }

    fn upstream_resume(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_upstream_resume(line);
    }

    fn downstream_establish(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_downstream_establish(line);
    }

    fn downstream_payload(&self, ctx: &NodeContext, line: &Line, buf: Sbuf) {
        ctx.forward_downstream_payload(line, buf);
    }

    fn downstream_finish(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_downstream_finish(line);
    }

    fn downstream_pause(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_downstream_pause(line);
    }

    fn downstream_resume(&self, ctx: &NodeContext, line: &Line) {
        ctx.forward_downstream_resume(line);
    }
}

/// Handed to a node's callback on every dispatch
///
/// Carries the node's own identity within the chain (used to index its
/// [`Line::state`] slot) and a reference to the [`Chain`] it belongs to,
/// so a node never needs to hold a reference to its neighbors directly
/// — it asks the chain to forward on its behalf, which is what lets the
/// engine enforce the packet-tunnel and chain-end invariants in one
/// place.
pub struct NodeContext<'a> {
    pub(crate) chain: &'a Chain,
    pub(crate) id: NodeId,
}

impl<'a> NodeContext<'a> {
    /// This node's own slot in `line`'s per-node state arena,
    /// initializing it with `init` on first access.
    pub fn state<'b, T: 'static>(
        &self,
        line: &'b Line,
        init: impl FnOnce() -> T,
    ) -> std::cell::RefMut<'b, T> {
        line.state(self.id.0, init)
    }

    /// This node's statically declared left padding requirement.
    pub fn required_padding_left(&self) -> usize {
        self.chain.required_padding_left_of(self.id)
    }

    /// The chain's maximum declared `required_padding_left` across all
    /// nodes — the left reservation a node should give any fresh
    /// buffer it allocates so downstream nodes can prepend headers into
    /// it without reallocating.
    pub fn max_required_padding_left(&self) -> usize {
        self.chain.max_required_padding_left()
    }

    pub fn forward_upstream_establish(&self, line: &Line) {
        self.chain.dispatch_upstream_establish(self.id, line);
    }

    pub fn forward_upstream_payload(&self, line: &Line, buf: Sbuf) {
        self.chain.dispatch_upstream_payload(self.id, line, buf);
    }

    pub fn forward_upstream_finish(&self, line: &Line) {
        self.chain.dispatch_upstream_finish(self.id, line);
    }

    pub fn forward_upstream_pause(&self, line: &Line) {
        self.chain.dispatch_upstream_pause(self.id, line);
    }

    pub fn forward_upstream_resume(&self, line: &Line) {
        self.chain.dispatch_upstream_resume(self.id, line);
    }

    pub fn forward_downstream_establish(&self, line: &Line) {
        self.chain.dispatch_downstream_establish(self.id, line);
    }

    pub fn forward_downstream_payload(&self, line: &Line, buf: Sbuf) {
        self.chain.dispatch_downstream_payload(self.id, line, buf);
    }

    pub fn forward_downstream_finish(&self, line: &Line) {
        self.chain.dispatch_downstream_finish(self.id, line);
    }

    pub fn forward_downstream_pause(&self, line: &Line) {
        self.chain.dispatch_downstream_pause(self.id, line);
    }

    pub fn forward_downstream_resume(&self, line: &Line) {
        self.chain.dispatch_downstream_resume(self.id, line);
    }
}
