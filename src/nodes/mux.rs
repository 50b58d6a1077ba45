use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use serde_json::Value;
use tracing::trace;

use crate::descriptor::{ChainPosition, LayerGroup, NodeDescriptor, NodeFactory};
use crate::error::NodeError;
use crate::line::Line;
use crate::node::{NodeContext, TunnelNode};
use crate::packet::NodeInterface;
use crate::sbuf::Sbuf;

const FLAGS_LEN: usize = 1;
const STREAM_ID_LEN: usize = 4;
const LENGTH_LEN: usize = 2;

/// Size of a multiplexer frame header: `{flags, stream_id, length}`.
pub const HEADER_SIZE: usize = FLAGS_LEN + STREAM_ID_LEN + LENGTH_LEN;

struct Child {
    line: Line,
    sink: Rc<dyn Fn(&Line, Sbuf)>,
}

/// Reference multiplexer node: fans many logical connections ("child
/// lines") onto one transport line, keyed by a per-child stream id.
///
/// The chain event router forwards one [`Line`] through a fixed
/// sequence of nodes; a multiplexer's whole purpose is to break that
/// 1:1 relationship, so rather than force-fitting fan-in/fan-out
/// through the router's node-to-node dispatch, this reference
/// implementation exposes the encode and decode halves directly:
/// [`MuxNode::open_child`] registers a new logical stream and returns
/// the [`Line`] that tracks its lifetime; [`MuxNode::send`] writes the
/// frame header into a child's payload via [`Sbuf::shift_left`] (no
/// copy) and hands the framed buffer to the caller-supplied transport
/// sink; [`TunnelNode::downstream_payload`] parses an inbound frame off
/// the transport and routes the unwrapped payload to the matching
/// child's sink by `stream_id`.
pub struct MuxNode {
    children: RefCell<HashMap<u32, Child>>,
    next_stream_id: Cell<u32>,
}

impl MuxNode {
    pub fn new() -> MuxNode {
        MuxNode {
            children: RefCell::new(HashMap::new()),
            next_stream_id: Cell::new(1),
        }
    }

    /// Register a new logical stream. `sink` receives every payload the
    /// transport demultiplexes back to this stream. Returns the
    /// assigned `stream_id` and the [`Line`] tracking the child's
    /// liveness.
    pub fn open_child(&self, sink: Rc<dyn Fn(&Line, Sbuf)>) -> (u32, Line) {
        let id = self.next_stream_id.get();
        self.next_stream_id.set(id + 1);
        let line = Line::new(0);
        self.children.borrow_mut().insert(
            id,
            Child {
                line: line.clone(),
                sink,
            },
        );
        (id, line)
    }

    /// Deregister a logical stream; further frames for `stream_id` are
    /// dropped rather than delivered.
    pub fn close_child(&self, stream_id: u32) {
        if let Some(child) = self.children.borrow_mut().remove(&stream_id) {
            child.line.finish();
        }
    }

    /// Frame `payload` for `stream_id` and hand it to `transport_send`.
    ///
    /// # Panics
    ///
    /// Panics if `payload.reserved_left() < HEADER_SIZE`, or if the
    /// payload is too large to fit the 16-bit length field.
    pub fn send(&self, stream_id: u32, mut payload: Sbuf, transport_send: impl FnOnce(Sbuf)) {
        let length = payload.length();
        assert!(length <= u16::MAX as usize, "MuxNode::send: payload too large for a single frame");
        payload.shift_left(HEADER_SIZE);
        {
            let view = payload.mutable_view();
            view[0] = 0;
            BigEndian::write_u32(&mut view[FLAGS_LEN..FLAGS_LEN + STREAM_ID_LEN], stream_id);
            BigEndian::write_u16(&mut view[FLAGS_LEN + STREAM_ID_LEN..HEADER_SIZE], length as u16);
        }
        transport_send(payload);
    }
}

impl Default for MuxNode {
    fn default() -> MuxNode {
        MuxNode::new()
    }
}

impl TunnelNode for MuxNode {
    fn downstream_payload(&self, _ctx: &NodeContext, _transport_line: &Line, mut buf: Sbuf) {
        if buf.length() < HEADER_SIZE {
            trace!(len = buf.length(), "mux: frame shorter than header, dropping");
            return;
        }
        let header = buf.view()[..HEADER_SIZE].to_vec();
        let stream_id = BigEndian::read_u32(&header[FLAGS_LEN..FLAGS_LEN + STREAM_ID_LEN]);
        let length = BigEndian::read_u16(&header[FLAGS_LEN + STREAM_ID_LEN..HEADER_SIZE]) as usize;
        buf.shift_right(HEADER_SIZE);
        if buf.length() != length {
            trace!(stream_id, declared = length, actual = buf.length(), "mux: frame length mismatch, dropping");
            return;
        }

        let children = self.children.borrow();
        match children.get(&stream_id) {
            Some(child) => (child.sink)(&child.line, buf),
            None => trace!(stream_id, "mux: payload for unknown or closed stream, dropping"),
        }
    }
}

/// Builds [`MuxNode`] instances. Takes no configuration.
pub struct MuxNodeFactory;

impl NodeFactory for MuxNodeFactory {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            type_name: "stream_multiplexer",
            version: 1,
            layer_group: LayerGroup::L4,
            position: ChainPosition::Middle,
            interface: NodeInterface::Stream,
            required_padding_left: HEADER_SIZE,
        }
    }

    fn build(&self, _config: &Value) -> Result<Box<dyn TunnelNode>, NodeError> {
        Ok(Box::new(MuxNode::new()))
    }
}
