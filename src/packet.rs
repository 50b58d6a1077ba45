use tracing::error;

use crate::sbuf::Sbuf;

/// Which event interface a node speaks
///
/// Most nodes speak [`NodeInterface::Stream`]: the five upstream/five
/// downstream callbacks in [`crate::node::TunnelNode`] operate on
/// arbitrarily-sized, arbitrarily-fragmented chunks of a byte stream,
/// with `pause`/`resume` providing backpressure and `finish` tearing
/// the connection down.
///
/// A node that operates on whole IP datagrams instead — a TUN device, an
/// IP-header rewriter — declares [`NodeInterface::PacketTunnel`]. For
/// such a node, every `payload` event it sees or produces carries
/// exactly one datagram; the engine never splits or reassembles across
/// event boundaries. Because a single datagram has no notion of partial
/// delivery, `pause`, `resume` and `finish` on the stream interface
/// don't make sense for these nodes, and calling them is a programming
/// mistake in the chain, not a runtime condition: the engine traps the
/// call and aborts rather than forwarding it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NodeInterface {
    /// Byte-stream events: establish/payload/finish/pause/resume, any
    /// payload may be a partial or coalesced unit.
    Stream,
    /// Whole-datagram events only: pause/resume/finish are hard errors.
    PacketTunnel,
}

/// A single IP datagram in transit
///
/// A thin wrapper over [`Sbuf`] used at the boundary of the
/// packet-tunnel interface, so that `packet_received`/`packet_send`
/// signatures make the one-datagram-per-buffer contract visible in the
/// type rather than only in documentation.
pub struct Datagram(pub Sbuf);

impl Datagram {
    /// Unwrap into the underlying buffer.
    pub fn into_sbuf(self) -> Sbuf {
        self.0
    }
}

/// Log at FATAL and abort the process
///
/// Called when the chain's event router is about to invoke a
/// stream-interface `pause`, `resume` or `finish` callback on a node
/// whose descriptor declares [`NodeInterface::PacketTunnel`]. Logs and
/// aborts rather than silently ignoring or returning an error — a
/// chain that reaches this point was built incorrectly, and continuing
/// to run it would be unsafe.
#[inline(never)]
#[cold]
pub fn packet_tunnel_hard_error(node_type: &str, event: &str) -> ! {
    error!(
        node_type,
        event, "stream-interface event called on a packet-tunnel node; this is a programming error"
    );
    panic!("packet-tunnel node \"{node_type}\" received stream-interface event \"{event}\"");
}
