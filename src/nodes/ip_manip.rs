use serde::Deserialize;
use serde_json::Value;

use crate::descriptor::{ChainPosition, LayerGroup, NodeDescriptor, NodeFactory};
use crate::error::NodeError;
use crate::line::Line;
use crate::node::{NodeContext, TunnelNode};
use crate::packet::{packet_tunnel_hard_error, NodeInterface};
use crate::sbuf::Sbuf;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV4_PROTOCOL_OFFSET: usize = 9;

/// Configuration for an [`IpManipulatorNode`].
#[derive(Debug, Deserialize)]
pub struct IpManipulatorConfig {
    /// IPv4 protocol number to match on the way upstream (e.g. 6 for
    /// TCP).
    pub original_protocol: u8,
    /// Value to rewrite it to, e.g. for obfuscating a TCP-in-IP tunnel
    /// behind a middlebox that treats unrecognized protocol numbers
    /// differently.
    pub replacement_protocol: u8,
}

/// Reference IP-header rewriter: examines a buffer as an IPv4 header,
/// and if the protocol field matches `original_protocol`, rewrites it
/// to `replacement_protocol` and sets [`Line::set_recalculate_checksum`]
/// so a downstream TUN device recomputes the header checksum before
/// writing the datagram out. Downstream traffic is rewritten back so a
/// reply's IP header matches what the remote peer actually sent.
///
/// Declares [`NodeInterface::PacketTunnel`]: this node only ever sees
/// whole IP datagrams, and its `pause`/`resume`/`finish` overrides call
/// [`packet_tunnel_hard_error`] directly rather than handle the call.
/// The chain's event router independently refuses to dispatch these
/// events to a packet-tunnel node at all, so in practice this node's
/// own overrides are unreachable — they exist so the hard-error
/// behavior is visible at the type implementing it, not only in the
/// router that happens to guard it.
pub struct IpManipulatorNode {
    original_protocol: u8,
    replacement_protocol: u8,
}

impl IpManipulatorNode {
    pub fn new(original_protocol: u8, replacement_protocol: u8) -> IpManipulatorNode {
        IpManipulatorNode {
            original_protocol,
            replacement_protocol,
        }
    }

    fn rewrite(buf: &mut Sbuf, line: &Line, from: u8, to: u8) {
        if buf.length() < IPV4_MIN_HEADER_LEN {
            return;
        }
        let view = buf.mutable_view();
        if view[IPV4_PROTOCOL_OFFSET] == from {
            view[IPV4_PROTOCOL_OFFSET] = to;
            line.set_recalculate_checksum(true);
        }
    }
}

impl TunnelNode for IpManipulatorNode {
    fn upstream_payload(&self, ctx: &NodeContext, line: &Line, mut buf: Sbuf) {
        Self::rewrite(&mut buf, line, self.original_protocol, self.replacement_protocol);
        ctx.forward_upstream_payload(line, buf);
    }

    fn downstream_payload(&self, ctx: &NodeContext, line: &Line, mut buf: Sbuf) {
        Self::rewrite(&mut buf, line, self.replacement_protocol, self.original_protocol);
        ctx.forward_downstream_payload(line, buf);
    }

    fn upstream_finish(&self, _ctx: &NodeContext, _line: &Line) {
        packet_tunnel_hard_error("ip_manipulator", "upstream_finish");
    }

    fn downstream_finish(&self, _ctx: &NodeContext, _line: &Line) {
        packet_tunnel_hard_error("ip_manipulator", "downstream_finish");
    }

    fn upstream_pause(&self, _ctx: &NodeContext, _line: &Line) {
        packet_tunnel_hard_error("ip_manipulator", "upstream_pause");
    }

    fn downstream_pause(&self, _ctx: &NodeContext, _line: &Line) {
        packet_tunnel_hard_error("ip_manipulator", "downstream_pause");
    }

    fn upstream_resume(&self, _ctx: &NodeContext, _line: &Line) {
        packet_tunnel_hard_error("ip_manipulator", "upstream_resume");
    }

    fn downstream_resume(&self, _ctx: &NodeContext, _line: &Line) {
        packet_tunnel_hard_error("ip_manipulator", "downstream_resume");
    }
}

/// Builds [`IpManipulatorNode`] instances from configuration.
pub struct IpManipulatorNodeFactory;

impl NodeFactory for IpManipulatorNodeFactory {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            type_name: "ip_manipulator",
            version: 1,
            layer_group: LayerGroup::Any,
            position: ChainPosition::Middle,
            interface: NodeInterface::PacketTunnel,
            required_padding_left: 0,
        }
    }

    fn build(&self, config: &Value) -> Result<Box<dyn TunnelNode>, NodeError> {
        let config: IpManipulatorConfig =
            serde_json::from_value(config.clone()).map_err(|source| NodeError::InvalidConfig {
                type_name: "ip_manipulator",
                source,
            })?;
        Ok(Box::new(IpManipulatorNode::new(
            config.original_protocol,
            config.replacement_protocol,
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::ChainBuilder;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ipv4_packet(protocol: u8) -> Sbuf {
        let mut buf = Sbuf::allocate(20, 0);
        buf.append(&[0u8; 20]);
        buf.mutable_view()[0] = 0x45;
        buf.mutable_view()[IPV4_PROTOCOL_OFFSET] = protocol;
        buf
    }

    struct Tail {
        received: RefCell<Vec<u8>>,
    }

    impl TunnelNode for Rc<Tail> {
        // Chain-end sink: consumes establish instead of forwarding past
        // the end of the chain.
        fn upstream_establish(&self, _ctx: &NodeContext, _line: &Line) {}

        fn upstream_payload(&self, _ctx: &NodeContext, _line: &Line, buf: Sbuf) {
            *self.received.borrow_mut() = buf.view().to_vec();
        }
    }

    fn build_chain() -> (crate::chain::Chain, Rc<Tail>) {
        let tail = Rc::new(Tail {
            received: RefCell::new(Vec::new()),
        });
        let mut builder = ChainBuilder::new();
        builder.push_node(
            NodeDescriptor {
                type_name: "ip_manipulator",
                version: 1,
                layer_group: LayerGroup::Any,
                position: ChainPosition::Head,
                interface: NodeInterface::PacketTunnel,
                required_padding_left: 0,
            },
            Box::new(IpManipulatorNode::new(6, 200)),
        );
        builder.push_node(
            NodeDescriptor {
                type_name: "tail",
                version: 1,
                layer_group: LayerGroup::Any,
                position: ChainPosition::End,
                interface: NodeInterface::PacketTunnel,
                required_padding_left: 0,
            },
            Box::new(tail.clone()),
        );
        (builder.build().unwrap(), tail)
    }

    #[test]
    fn matching_protocol_is_rewritten_and_checksum_flag_set() {
        let (chain, tail) = build_chain();
        let line = chain.on_accept();
        chain.on_payload(&line, ipv4_packet(6));
        assert_eq!(tail.received.borrow()[IPV4_PROTOCOL_OFFSET], 200);
        assert!(line.recalculate_checksum());
    }

    #[test]
    fn non_matching_protocol_passes_through_unchanged() {
        let (chain, tail) = build_chain();
        let line = chain.on_accept();
        chain.on_payload(&line, ipv4_packet(17));
        assert_eq!(tail.received.borrow()[IPV4_PROTOCOL_OFFSET], 17);
        assert!(!line.recalculate_checksum());
    }

    #[test]
    fn short_buffer_is_left_alone() {
        let node = IpManipulatorNode::new(6, 200);
        let line = Line::new(0);
        let mut buf = Sbuf::from_slice(&[0x45, 0x00]);
        IpManipulatorNode::rewrite(&mut buf, &line, 6, 200);
        assert!(!line.recalculate_checksum());
        assert_eq!(buf.view(), &[0x45, 0x00]);
    }

    #[test]
    #[should_panic]
    fn finish_on_packet_tunnel_node_is_a_hard_error() {
        let (chain, _tail) = build_chain();
        let line = chain.on_accept();
        chain.on_finish(&line);
    }
}
