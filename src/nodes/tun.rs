use std::cell::RefCell;

use serde_json::Value;

use crate::descriptor::{ChainPosition, LayerGroup, NodeDescriptor, NodeFactory};
use crate::error::NodeError;
use crate::line::Line;
use crate::node::{NodeContext, TunnelNode};
use crate::packet::NodeInterface;
use crate::sbuf::Sbuf;

/// Minimal stand-in for a TUN-device boundary node: a chain anchor that
/// is simultaneously the chain head and chain end, speaking
/// [`LayerGroup::L3`].
///
/// Actually opening a TUN/TAP device and reading/writing datagrams to
/// it is platform glue this node doesn't attempt; what it preserves is
/// the descriptor shape and the packet-tunnel contract, so a chain can
/// be built and exercised end-to-end without an OS device backing it.
/// `upstream_payload` and `downstream_payload` both record the
/// datagram they receive rather than handing it to a real device;
/// [`TunDevice::received`] exposes what was recorded. `upstream_establish`
/// and `downstream_establish` consume the event rather than forward it —
/// there is no node beyond a TUN device in either direction, so the
/// default forwarding behavior would dispatch past the chain boundary.
pub struct TunDevice {
    received: RefCell<Vec<Sbuf>>,
}

impl TunDevice {
    pub fn new() -> TunDevice {
        TunDevice {
            received: RefCell::new(Vec::new()),
        }
    }

    /// Every datagram handed to this node so far, in order.
    pub fn received(&self) -> Vec<Sbuf> {
        self.received.borrow().clone()
    }
}

impl Default for TunDevice {
    fn default() -> TunDevice {
        TunDevice::new()
    }
}

impl TunnelNode for TunDevice {
    // A TUN device anchors both ends of the chain it sits in: there is
    // no node beyond it in either direction, so it must consume
    // `establish` rather than fall through to the default forwarding
    // behavior, which would dispatch past the chain boundary it
    // anchors and hit `fatal_chain_end`.
    fn upstream_establish(&self, _ctx: &NodeContext, _line: &Line) {}

    fn downstream_establish(&self, _ctx: &NodeContext, _line: &Line) {}

    fn upstream_payload(&self, _ctx: &NodeContext, _line: &Line, buf: Sbuf) {
        self.received.borrow_mut().push(buf);
    }

    fn downstream_payload(&self, _ctx: &NodeContext, _line: &Line, buf: Sbuf) {
        self.received.borrow_mut().push(buf);
    }
}

/// Lets a caller keep its own handle to inspect [`TunDevice::received`]
/// after building a chain, since [`crate::chain::Chain`] otherwise owns
/// its nodes outright as `Box<dyn TunnelNode>`.
impl TunnelNode for std::rc::Rc<TunDevice> {
    fn upstream_establish(&self, ctx: &NodeContext, line: &Line) {
        TunDevice::upstream_establish(self, ctx, line);
    }

    fn downstream_establish(&self, ctx: &NodeContext, line: &Line) {
        TunDevice::downstream_establish(self, ctx, line);
    }

    fn upstream_payload(&self, ctx: &NodeContext, line: &Line, buf: Sbuf) {
        TunDevice::upstream_payload(self, ctx, line, buf);
    }

    fn downstream_payload(&self, ctx: &NodeContext, line: &Line, buf: Sbuf) {
        TunDevice::downstream_payload(self, ctx, line, buf);
    }
}

/// Builds [`TunDevice`] instances. Takes no configuration.
pub struct TunDeviceFactory;

impl NodeFactory for TunDeviceFactory {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            type_name: "tun_device",
            version: 1,
            layer_group: LayerGroup::L3,
            position: ChainPosition::End,
            interface: NodeInterface::PacketTunnel,
            required_padding_left: 0,
        }
    }

    fn build(&self, _config: &Value) -> Result<Box<dyn TunnelNode>, NodeError> {
        Ok(Box::new(TunDevice::new()))
    }
}
