use byteorder::{BigEndian, ByteOrder};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::descriptor::{ChainPosition, LayerGroup, NodeDescriptor, NodeFactory};
use crate::error::NodeError;
use crate::line::Line;
use crate::node::{NodeContext, TunnelNode};
use crate::packet::NodeInterface;
use crate::sbuf::Sbuf;
use crate::stream::BufferStream;

/// Configuration for a [`FramingNode`].
#[derive(Debug, Deserialize)]
pub struct FramingConfig {
    /// Width in bytes of the big-endian length prefix in front of every
    /// frame. Must be between 1 and 8.
    pub header_size: usize,
    /// Largest payload this node will ever forward; also bounds the
    /// drop-on-overflow threshold at `2 * max_packet_length`.
    pub max_packet_length: usize,
}

/// Reference framing node: unwraps length-prefixed frames from a byte
/// stream, e.g. datagrams tunneled over a TCP connection.
///
/// Per-line state is a [`BufferStream`] accumulating whatever chunks the
/// transport below delivered. On every upstream payload the node:
///
/// 1. Appends the new bytes to the stream.
/// 2. If the stream now holds more than `2 * max_packet_length` bytes
///    without having found a valid frame, drops everything buffered —
///    a peer sending garbage cannot grow memory unbounded.
/// 3. Under [`Line::lock`], repeatedly peeks a `header_size`-byte
///    length prefix, waits for the full frame to arrive, then forwards
///    exactly one payload per complete frame and zero for an
///    incomplete one, breaking early if the line dies mid-loop.
pub struct FramingNode {
    header_size: usize,
    max_packet_length: usize,
}

impl FramingNode {
    pub fn new(header_size: usize, max_packet_length: usize) -> FramingNode {
        assert!(
            (1..=8).contains(&header_size),
            "FramingNode: header_size must be between 1 and 8"
        );
        FramingNode {
            header_size,
            max_packet_length,
        }
    }
}

impl TunnelNode for FramingNode {
    fn upstream_payload(&self, ctx: &NodeContext, line: &Line, buf: Sbuf) {
        let left_padding = ctx.max_required_padding_left();
        let mut stream = ctx.state(line, || BufferStream::new(left_padding));
        stream.push(buf);

        if stream.len() > 2 * self.max_packet_length {
            trace!(len = stream.len(), "framing node: overflow, dropping buffered stream");
            stream.empty();
            return;
        }

        let _guard = line.lock();
        let mut header = vec![0u8; self.header_size];
        loop {
            if stream.len() < self.header_size + 1 {
                break;
            }

            stream.view_bytes_at(0, &mut header, self.header_size);
            let frame_len = BigEndian::read_uint(&header, self.header_size) as usize;
            let total = self.header_size + frame_len;

            if frame_len < 1 || total > stream.len() {
                break;
            }

            let mut frame = stream
                .read_exact(total)
                .expect("read_exact: length already checked against buffered length");
            frame.shift_right(self.header_size);

            drop(stream);
            ctx.forward_upstream_payload(line, frame);
            stream = ctx.state(line, || unreachable!("buffer stream already initialized"));

            if !line.is_alive() {
                break;
            }
        }
    }
}

impl NodeFactory for FramingNodeFactory {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            type_name: "udp_over_tcp_framing",
            version: 1,
            layer_group: LayerGroup::L4,
            position: ChainPosition::Head,
            interface: NodeInterface::Stream,
            required_padding_left: 0,
        }
    }

    fn build(&self, config: &Value) -> Result<Box<dyn TunnelNode>, NodeError> {
        let config: FramingConfig =
            serde_json::from_value(config.clone()).map_err(|source| NodeError::InvalidConfig {
                type_name: "udp_over_tcp_framing",
                source,
            })?;
        Ok(Box::new(FramingNode::new(config.header_size, config.max_packet_length)))
    }
}

/// Builds [`FramingNode`] instances from configuration.
pub struct FramingNodeFactory;

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::ChainBuilder;

    struct Tail {
        received: std::cell::RefCell<Vec<Vec<u8>>>,
    }

    impl TunnelNode for std::rc::Rc<Tail> {
        // Chain-end sink: consumes establish instead of forwarding past
        // the end of the chain.
        fn upstream_establish(&self, _ctx: &NodeContext, _line: &Line) {}

        fn upstream_payload(&self, _ctx: &NodeContext, _line: &Line, buf: Sbuf) {
            self.received.borrow_mut().push(buf.view().to_vec());
        }
    }

    fn build_chain(max_packet_length: usize) -> (crate::chain::Chain, std::rc::Rc<Tail>) {
        let tail = std::rc::Rc::new(Tail {
            received: std::cell::RefCell::new(Vec::new()),
        });

        let mut builder = ChainBuilder::new();
        builder.push_node(
            NodeDescriptor {
                type_name: "udp_over_tcp_framing",
                version: 1,
                layer_group: LayerGroup::L4,
                position: ChainPosition::Head,
                interface: NodeInterface::Stream,
                required_padding_left: 0,
            },
            Box::new(FramingNode::new(2, max_packet_length)),
        );
        builder.push_node(
            NodeDescriptor {
                type_name: "tail",
                version: 1,
                layer_group: LayerGroup::L4,
                position: ChainPosition::End,
                interface: NodeInterface::Stream,
                required_padding_left: 0,
            },
            Box::new(tail.clone()),
        );
        (builder.build().unwrap(), tail)
    }

    #[test]
    fn splits_two_frames_from_one_chunk() {
        let (chain, tail) = build_chain(1024);
        let line = chain.on_accept();
        chain.on_payload(
            &line,
            Sbuf::from_slice(&[0x00, 0x03, 0x01, 0x02, 0x03, 0x00, 0x02, 0x04, 0x05]),
        );
        let received = tail.received.borrow();
        assert_eq!(*received, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn incomplete_frame_emits_nothing() {
        let (chain, tail) = build_chain(1024);
        let line = chain.on_accept();
        chain.on_payload(&line, Sbuf::from_slice(&[0x00, 0x05, 0x01, 0x02]));
        assert!(tail.received.borrow().is_empty());
    }

    #[test]
    fn overflow_drops_without_crashing() {
        let (chain, tail) = build_chain(100);
        let line = chain.on_accept();
        let garbage = vec![0xAAu8; 65_535];
        chain.on_payload(&line, Sbuf::from_slice(&garbage));
        assert!(tail.received.borrow().is_empty());
    }

    #[test]
    fn zero_length_payload_is_a_noop() {
        let (chain, tail) = build_chain(1024);
        let line = chain.on_accept();
        chain.on_payload(&line, Sbuf::from_slice(&[]));
        assert!(tail.received.borrow().is_empty());
    }

    #[test]
    fn frame_spanning_header_size_plus_one_byte() {
        let (chain, tail) = build_chain(1024);
        let line = chain.on_accept();
        chain.on_payload(&line, Sbuf::from_slice(&[0x00, 0x01, 0xFF]));
        assert_eq!(*tail.received.borrow(), vec![vec![0xFF]]);
    }
}
