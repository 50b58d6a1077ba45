use serde_json::Value;
use tracing::error;

use crate::descriptor::{ChainPosition, NodeDescriptor, NodeFactory};
use crate::error::EngineError;
use crate::line::Line;
use crate::node::{NodeContext, NodeId, TunnelNode};
use crate::packet::{packet_tunnel_hard_error, Datagram, NodeInterface};
use crate::sbuf::Sbuf;

struct NodeEntry {
    node: Box<dyn TunnelNode>,
    descriptor: NodeDescriptor,
}

/// Validates and assembles a linear sequence of nodes into a [`Chain`]
///
/// Runs every check once at build time: layer-group compatibility
/// between every adjacent pair, each node's declared [`ChainPosition`]
/// against its actual position, and the maximum `required_padding_left`
/// across the whole chain.
#[derive(Default)]
pub struct ChainBuilder {
    entries: Vec<NodeEntry>,
}

impl ChainBuilder {
    pub fn new() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Append an already-constructed node and its descriptor. Used
    /// directly by tests and by callers assembling a chain out of
    /// reference nodes that don't need factory-based configuration.
    pub fn push_node(&mut self, descriptor: NodeDescriptor, node: Box<dyn TunnelNode>) -> &mut Self {
        self.entries.push(NodeEntry { node, descriptor });
        self
    }

    /// Build a node from `factory` with `config` and append it.
    pub fn push(&mut self, factory: &dyn NodeFactory, config: &Value) -> Result<&mut Self, EngineError> {
        let descriptor = factory.descriptor();
        let index = self.entries.len();
        let node = factory.build(config).map_err(|source| EngineError::Factory {
            index,
            type_name: descriptor.type_name,
            source,
        })?;
        self.entries.push(NodeEntry { node, descriptor });
        Ok(self)
    }

    /// Validate the accumulated nodes and produce a [`Chain`].
    pub fn build(self) -> Result<Chain, EngineError> {
        let entries = self.entries;
        if entries.is_empty() {
            return Err(EngineError::EmptyChain);
        }

        let last = entries.len() - 1;
        for (index, entry) in entries.iter().enumerate() {
            let has_prev = index > 0;
            let has_next = index < last;
            if has_prev == entry.descriptor.position.is_head() {
                return Err(EngineError::BadPosition {
                    index,
                    type_name: entry.descriptor.type_name,
                    expected: position_name(entry.descriptor.position),
                });
            }
            if has_next == entry.descriptor.position.is_end() {
                return Err(EngineError::BadPosition {
                    index,
                    type_name: entry.descriptor.type_name,
                    expected: position_name(entry.descriptor.position),
                });
            }
        }

        for index in 0..last {
            let this = &entries[index].descriptor;
            let next = &entries[index + 1].descriptor;
            if !this.layer_group.compatible_with(next.layer_group) {
                return Err(EngineError::IncompatibleLayers {
                    index,
                    type_name: this.type_name,
                    layer: this.layer_group,
                    neighbor_index: index + 1,
                    neighbor_type_name: next.type_name,
                    neighbor_layer: next.layer_group,
                });
            }
        }

        let max_required_padding_left = entries
            .iter()
            .map(|entry| entry.descriptor.required_padding_left)
            .max()
            .unwrap_or(0);

        Ok(Chain {
            entries,
            max_required_padding_left,
        })
    }
}

fn position_name(position: ChainPosition) -> &'static str {
    match position {
        ChainPosition::Middle => "Middle",
        ChainPosition::Head => "Head",
        ChainPosition::End => "End",
        ChainPosition::HeadAndEnd => "HeadAndEnd",
    }
}

/// A validated, immutable sequence of nodes and the event router that
/// dispatches between them
///
/// Every inbound or outbound unit of work enters through one of the
/// transport-facing entry points (`on_accept`, `on_payload`,
/// `on_downstream_payload`, ...) and is then forwarded node to node by
/// the `dispatch_*`/`forward_*` pair on [`NodeContext`], one hop at a
/// time. The router enforces, in one place, the two invariants that are
/// fatal if violated: dispatching past the end of the chain, and
/// dispatching a stream-only event (`pause`/`resume`/`finish`) to a
/// packet-tunnel node.
pub struct Chain {
    entries: Vec<NodeEntry>,
    max_required_padding_left: usize,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_required_padding_left(&self) -> usize {
        self.max_required_padding_left
    }

    pub(crate) fn required_padding_left_of(&self, id: NodeId) -> usize {
        self.entries[id.0].descriptor.required_padding_left
    }

    /// Create a new line sized for this chain and dispatch the initial
    /// `upstream_establish` event at the head node. Used by a transport
    /// binding on new-connection accept.
    pub fn on_accept(&self) -> Line {
        let line = Line::new(self.entries.len());
        self.call_upstream_establish(0, &line);
        line
    }

    /// Dispatch an upstream payload at the head node. `buf` must have
    /// at least [`Chain::max_required_padding_left`] bytes of left
    /// reservation.
    pub fn on_payload(&self, line: &Line, buf: Sbuf) {
        debug_assert!(
            buf.reserved_left() >= self.max_required_padding_left,
            "on_payload: buffer does not carry the chain's required left padding"
        );
        self.call_upstream_payload(0, line, buf);
    }

    /// Dispatch an upstream finish at the head node, e.g. on transport
    /// connection reset.
    pub fn on_finish(&self, line: &Line) {
        self.call_upstream_finish(0, line);
    }

    /// Alias for [`Chain::on_payload`] for a packet-tunnel-interface
    /// head (a TUN device reading a datagram off the OS), making the
    /// one-datagram-per-call contract visible at the call site.
    pub fn packet_received(&self, line: &Line, datagram: Datagram) {
        debug_assert_eq!(
            self.entries[0].descriptor.interface,
            NodeInterface::PacketTunnel,
            "packet_received called on a chain whose head is not a packet-tunnel node"
        );
        self.on_payload(line, datagram.into_sbuf());
    }

    /// Dispatch a downstream payload at the tail node, e.g. a response
    /// arriving from the network for a transport binding to inject.
    pub fn on_downstream_payload(&self, line: &Line, buf: Sbuf) {
        let tail = self.entries.len() - 1;
        self.call_downstream_payload(tail, line, buf);
    }

    /// Dispatch a downstream establish at the tail node.
    pub fn on_downstream_establish(&self, line: &Line) {
        let tail = self.entries.len() - 1;
        self.call_downstream_establish(tail, line);
    }

    /// Dispatch a downstream finish at the tail node.
    pub fn on_downstream_finish(&self, line: &Line) {
        let tail = self.entries.len() - 1;
        self.call_downstream_finish(tail, line);
    }

    // -- upstream dispatch, called by NodeContext::forward_upstream_* --

    pub(crate) fn dispatch_upstream_establish(&self, from: NodeId, line: &Line) {
        match self.next_index(from) {
            Some(next) => self.call_upstream_establish(next, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "upstream_establish"),
        }
    }

    pub(crate) fn dispatch_upstream_payload(&self, from: NodeId, line: &Line, buf: Sbuf) {
        match self.next_index(from) {
            Some(next) => self.call_upstream_payload(next, line, buf),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "upstream_payload"),
        }
    }

    pub(crate) fn dispatch_upstream_finish(&self, from: NodeId, line: &Line) {
        match self.next_index(from) {
            Some(next) => self.call_upstream_finish(next, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "upstream_finish"),
        }
    }

    pub(crate) fn dispatch_upstream_pause(&self, from: NodeId, line: &Line) {
        match self.next_index(from) {
            Some(next) => self.call_upstream_pause(next, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "upstream_pause"),
        }
    }

    pub(crate) fn dispatch_upstream_resume(&self, from: NodeId, line: &Line) {
        match self.next_index(from) {
            Some(next) => self.call_upstream_resume(next, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "upstream_resume"),
        }
    }

    // -- downstream dispatch, called by NodeContext::forward_downstream_* --

    pub(crate) fn dispatch_downstream_establish(&self, from: NodeId, line: &Line) {
        match self.prev_index(from) {
            Some(prev) => self.call_downstream_establish(prev, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "downstream_establish"),
        }
    }

    pub(crate) fn dispatch_downstream_payload(&self, from: NodeId, line: &Line, buf: Sbuf) {
        match self.prev_index(from) {
            Some(prev) => self.call_downstream_payload(prev, line, buf),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "downstream_payload"),
        }
    }

    pub(crate) fn dispatch_downstream_finish(&self, from: NodeId, line: &Line) {
        match self.prev_index(from) {
            Some(prev) => self.call_downstream_finish(prev, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "downstream_finish"),
        }
    }

    pub(crate) fn dispatch_downstream_pause(&self, from: NodeId, line: &Line) {
        match self.prev_index(from) {
            Some(prev) => self.call_downstream_pause(prev, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "downstream_pause"),
        }
    }

    pub(crate) fn dispatch_downstream_resume(&self, from: NodeId, line: &Line) {
        match self.prev_index(from) {
            Some(prev) => self.call_downstream_resume(prev, line),
            None => fatal_chain_end(self.entries[from.0].descriptor.type_name, "downstream_resume"),
        }
    }

    fn next_index(&self, from: NodeId) -> Option<usize> {
        let next = from.0 + 1;
        (next < self.entries.len()).then_some(next)
    }

    fn prev_index(&self, from: NodeId) -> Option<usize> {
        from.0.checked_sub(1)
    }

    fn ctx(&self, index: usize) -> NodeContext<'_> {
        NodeContext {
            chain: self,
            id: NodeId(index),
        }
    }

    fn call_upstream_establish(&self, index: usize, line: &Line) {
        self.entries[index].node.upstream_establish(&self.ctx(index), line);
    }

    fn call_upstream_payload(&self, index: usize, line: &Line, buf: Sbuf) {
        self.entries[index].node.upstream_payload(&self.ctx(index), line, buf);
    }

    fn call_upstream_finish(&self, index: usize, line: &Line) {
        self.guard_stream_only(index, "upstream_finish");
        self.entries[index].node.upstream_finish(&self.ctx(index), line);
    }

    fn call_upstream_pause(&self, index: usize, line: &Line) {
        self.guard_stream_only(index, "upstream_pause");
        self.entries[index].node.upstream_pause(&self.ctx(index), line);
    }

    fn call_upstream_resume(&self, index: usize, line: &Line) {
        self.guard_stream_only(index, "upstream_resume");
        self.entries[index].node.upstream_resume(&self.ctx(index), line);
    }

    fn call_downstream_establish(&self, index: usize, line: &Line) {
        self.entries[index].node.downstream_establish(&self.ctx(index), line);
    }

    fn call_downstream_payload(&self, index: usize, line: &Line, buf: Sbuf) {
        self.entries[index].node.downstream_payload(&self.ctx(index), line, buf);
    }

    fn call_downstream_finish(&self, index: usize, line: &Line) {
        self.guard_stream_only(index, "downstream_finish");
        self.entries[index].node.downstream_finish(&self.ctx(index), line);
    }

    fn call_downstream_pause(&self, index: usize, line: &Line) {
        self.guard_stream_only(index, "downstream_pause");
        self.entries[index].node.downstream_pause(&self.ctx(index), line);
    }

    fn call_downstream_resume(&self, index: usize, line: &Line) {
        self.guard_stream_only(index, "downstream_resume");
        self.entries[index].node.downstream_resume(&self.ctx(index), line);
    }

    fn guard_stream_only(&self, index: usize, event: &str) {
        let descriptor = &self.entries[index].descriptor;
        if descriptor.interface == NodeInterface::PacketTunnel {
            packet_tunnel_hard_error(descriptor.type_name, event);
        }
    }
}

#[inline(never)]
#[cold]
fn fatal_chain_end(type_name: &str, event: &str) -> ! {
    error!(type_name, event, "event router reached the end of the chain");
    panic!("{event} called with no next node beyond \"{type_name}\"");
}
