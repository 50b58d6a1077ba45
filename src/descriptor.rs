use serde_json::Value;

use crate::error::NodeError;
use crate::node::TunnelNode;
use crate::packet::NodeInterface;

/// Which layer of the stack a node's payloads belong to
///
/// Adjacent nodes in a chain must agree on layer: an L4 node's next
/// neighbor must itself be L4 or [`LayerGroup::Any`], never L3 directly,
/// and vice versa. `Any` nodes (the IP-header rewriter, most
/// observability nodes) are compatible on either side, declaring
/// themselves layer-agnostic so they can sit between an L4 multiplexer
/// and an L3 TUN device.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LayerGroup {
    /// Whole IP datagrams (TUN device, IP manipulator).
    L3,
    /// A byte stream or framed message stream (TCP, the framing node,
    /// the multiplexer).
    L4,
    /// Compatible with either neighbor layer.
    Any,
}

impl LayerGroup {
    /// True if a node declaring `self` may sit immediately next to a
    /// neighbor declaring `other`.
    pub fn compatible_with(self, other: LayerGroup) -> bool {
        matches!(
            (self, other),
            (LayerGroup::Any, _) | (_, LayerGroup::Any) | (LayerGroup::L3, LayerGroup::L3) | (LayerGroup::L4, LayerGroup::L4)
        )
    }
}

/// Where in a chain a node is allowed to sit
///
/// Modeled as a small enumerated set rather than independent booleans or
/// bitflags, while still allowing a node to be both the head and the
/// end of its chain at once — a TUN device is simultaneously the
/// ingress and egress of the chain it anchors.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ChainPosition {
    /// Must have both a previous and a next node.
    Middle,
    /// Must be first in the chain; may not have a previous node.
    Head,
    /// Must be last in the chain; may not have a next node.
    End,
    /// Both first and last — the chain has exactly one node.
    HeadAndEnd,
}

impl ChainPosition {
    /// True if a node declaring this position must not have a previous
    /// neighbor — used by the chain builder to validate a node's actual
    /// position against what it declares.
    pub fn is_head(self) -> bool {
        matches!(self, ChainPosition::Head | ChainPosition::HeadAndEnd)
    }

    /// True if a node declaring this position must not have a next
    /// neighbor.
    pub fn is_end(self) -> bool {
        matches!(self, ChainPosition::End | ChainPosition::HeadAndEnd)
    }
}

/// Static metadata a node contributes to chain validation and layout:
/// a type name, a version (carried for future wire compatibility
/// checks but unused by this engine — see `DESIGN.md`), the layer
/// group the node itself occupies, the chain position it requires, the
/// event interface it speaks, and the left padding it needs reserved
/// in every buffer it may prepend a header into.
#[derive(Clone, Debug)]
pub struct NodeDescriptor {
    pub type_name: &'static str,
    pub version: u32,
    pub layer_group: LayerGroup,
    pub position: ChainPosition,
    pub interface: NodeInterface,
    pub required_padding_left: usize,
}

/// Builds a configured node instance from an opaque configuration blob
///
/// The engine core never interprets `config` itself — it is handed
/// unchanged to [`NodeFactory::build`], which each reference node
/// implements by deserializing its own typed configuration struct out
/// of the `serde_json::Value` with `serde`, without the dispatch core
/// ever knowing the shape of any particular node's settings.
pub trait NodeFactory {
    /// Static metadata for this node type, independent of any particular
    /// instance's configuration.
    fn descriptor(&self) -> NodeDescriptor;

    /// Construct a configured instance of this node type.
    fn build(&self, config: &Value) -> Result<Box<dyn TunnelNode>, NodeError>;
}
