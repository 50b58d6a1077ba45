//! End-to-end chain scenarios exercising the event router, the framing
//! node and the IP-header rewriter together.

use std::cell::RefCell;
use std::rc::Rc;

use tunnelpipe::chain::ChainBuilder;
use tunnelpipe::descriptor::{ChainPosition, LayerGroup, NodeDescriptor};
use tunnelpipe::line::Line;
use tunnelpipe::node::{NodeContext, TunnelNode};
use tunnelpipe::nodes::framing::FramingNode;
use tunnelpipe::nodes::ip_manip::IpManipulatorNode;
use tunnelpipe::nodes::tun::TunDevice;
use tunnelpipe::packet::NodeInterface;
use tunnelpipe::sbuf::Sbuf;

fn descriptor(
    type_name: &'static str,
    position: ChainPosition,
    layer_group: LayerGroup,
    interface: NodeInterface,
) -> NodeDescriptor {
    NodeDescriptor {
        type_name,
        version: 1,
        layer_group,
        position,
        interface,
        required_padding_left: 0,
    }
}

/// A chain of `{framing, ip_manipulator(swap 0x06 -> 0x11), tun_device}`:
/// a length-prefixed IPv4 TCP SYN arrives at the head; the TUN device
/// should see exactly one datagram with the protocol field rewritten to
/// 0x11 and the checksum-recalculation flag set on the line.
#[test]
fn chain_rewrites_protocol_and_reaches_tun_device() {
    let tun = Rc::new(TunDevice::new());

    let mut builder = ChainBuilder::new();
    builder.push_node(
        descriptor("udp_over_tcp_framing", ChainPosition::Head, LayerGroup::L4, NodeInterface::Stream),
        Box::new(FramingNode::new(2, 4096)),
    );
    builder.push_node(
        descriptor("ip_manipulator", ChainPosition::Middle, LayerGroup::Any, NodeInterface::PacketTunnel),
        Box::new(IpManipulatorNode::new(0x06, 0x11)),
    );
    builder.push_node(
        descriptor("tun_device", ChainPosition::End, LayerGroup::Any, NodeInterface::PacketTunnel),
        Box::new(tun.clone()),
    );
    let chain = builder.build().unwrap();
    let line = chain.on_accept();

    let mut ipv4_syn = vec![0u8; 20];
    ipv4_syn[0] = 0x45; // version 4, IHL 5
    ipv4_syn[9] = 0x06; // TCP

    let mut input = vec![0x00, 0x14]; // length prefix = 20
    input.extend_from_slice(&ipv4_syn);

    chain.on_payload(&line, Sbuf::from_slice(&input));

    let received = tun.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].view()[0] >> 4, 4);
    assert_eq!(received[0].view()[9], 0x11);
    assert!(line.recalculate_checksum());
}

/// A chain-head node emits `establish` exactly once on accept, then
/// payload events in order — the generic shape every connection-oriented
/// head node (a framing node behind a listener, a TLS terminator on
/// handshake completion) must honor, independent of which specific node
/// produces it.
#[test]
fn establish_fires_once_before_any_payload() {
    let log = Rc::new(RefCell::new(Vec::new()));

    struct ForwardingHead {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl TunnelNode for ForwardingHead {
        fn upstream_establish(&self, ctx: &NodeContext, line: &Line) {
            self.log.borrow_mut().push("establish".to_string());
            ctx.forward_upstream_establish(line);
        }

        fn upstream_payload(&self, ctx: &NodeContext, line: &Line, buf: Sbuf) {
            self.log.borrow_mut().push(format!("payload:{}", buf.length()));
            ctx.forward_upstream_payload(line, buf);
        }
    }

    struct Sink {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl TunnelNode for Sink {
        fn upstream_establish(&self, _ctx: &NodeContext, _line: &Line) {
            self.log.borrow_mut().push("establish".to_string());
        }

        fn upstream_payload(&self, _ctx: &NodeContext, _line: &Line, buf: Sbuf) {
            self.log.borrow_mut().push(format!("payload:{}", buf.length()));
        }
    }

    let mut builder = ChainBuilder::new();
    builder.push_node(
        descriptor("head", ChainPosition::Head, LayerGroup::Any, NodeInterface::Stream),
        Box::new(ForwardingHead { log: log.clone() }),
    );
    builder.push_node(
        descriptor("tail", ChainPosition::End, LayerGroup::Any, NodeInterface::Stream),
        Box::new(Sink { log: log.clone() }),
    );
    let chain = builder.build().unwrap();
    let line = chain.on_accept();
    chain.on_payload(&line, Sbuf::from_slice(b"a"));
    chain.on_payload(&line, Sbuf::from_slice(b"bb"));

    assert_eq!(
        *log.borrow(),
        vec![
            "establish".to_string(),
            "establish".to_string(),
            "payload:1".to_string(),
            "payload:1".to_string(),
            "payload:2".to_string(),
            "payload:2".to_string(),
        ]
    );
}

/// A `finish` arrives while a framing node is mid-loop forwarding a
/// batch of frames. The loop must check liveness after every forwarded
/// payload and break cleanly rather than keep dispatching to a dead
/// line.
#[test]
fn finish_mid_loop_breaks_cleanly() {
    struct FinishAfterFirst;

    impl TunnelNode for FinishAfterFirst {
        // Chain-end sink: consumes establish instead of forwarding past
        // the end of the chain.
        fn upstream_establish(&self, _ctx: &NodeContext, _line: &Line) {}

        fn upstream_payload(&self, _ctx: &NodeContext, line: &Line, _buf: Sbuf) {
            line.finish();
        }
    }

    let mut builder = ChainBuilder::new();
    builder.push_node(
        descriptor("udp_over_tcp_framing", ChainPosition::Head, LayerGroup::L4, NodeInterface::Stream),
        Box::new(FramingNode::new(2, 4096)),
    );
    builder.push_node(
        descriptor("tail", ChainPosition::End, LayerGroup::L4, NodeInterface::Stream),
        Box::new(FinishAfterFirst),
    );
    let chain = builder.build().unwrap();
    let line = chain.on_accept();

    // Two complete frames in one chunk; the tail finishes the line
    // while the framing node's loop is still mid-batch.
    chain.on_payload(&line, Sbuf::from_slice(&[0x00, 0x01, b'A', 0x00, 0x01, b'B']));

    assert!(!line.is_alive());
}
