//! Composable network tunneling pipeline engine
//!
//! A chain is a user-configured, ordered list of **nodes** — TLS
//! termination, IP-header rewriting on a TUN device, stream
//! multiplexing over one transport, UDP-over-TCP framing, reverse-
//! tunnel rendezvous — through which traffic between a client-facing
//! ingress and a remote egress flows in both directions. This crate is
//! the engine those nodes plug into: the [`chain`] event router that
//! dispatches between them, the [`line`] per-connection state every
//! node shares, the [`sbuf`]/[`stream`] buffering primitives nodes use
//! to avoid copying, and the [`packet`] interface for nodes that speak
//! whole IP datagrams instead of a byte stream.
//!
//! # Building a chain
//!
//! A chain is assembled node by node through a [`chain::ChainBuilder`],
//! either from already-constructed nodes ([`chain::ChainBuilder::push_node`])
//! or from a [`descriptor::NodeFactory`] plus an opaque JSON
//! configuration blob ([`chain::ChainBuilder::push`]). Building
//! validates, once, up front: every adjacent pair of nodes must declare
//! compatible [`descriptor::LayerGroup`]s, every node's
//! [`descriptor::ChainPosition`] must match where it actually sits, and
//! the chain's maximum declared `required_padding_left` is computed so
//! transport bindings know how much left reservation to give a freshly
//! allocated buffer.
//!
//! ```
//! use tunnelpipe::chain::ChainBuilder;
//! use tunnelpipe::nodes::{framing::FramingNode, tun::TunDevice};
//! use tunnelpipe::descriptor::{ChainPosition, LayerGroup, NodeDescriptor};
//! use tunnelpipe::packet::NodeInterface;
//!
//! let mut builder = ChainBuilder::new();
//! builder.push_node(
//!     NodeDescriptor {
//!         type_name: "udp_over_tcp_framing",
//!         version: 1,
//!         layer_group: LayerGroup::Any,
//!         position: ChainPosition::Head,
//!         interface: NodeInterface::Stream,
//!         required_padding_left: 0,
//!     },
//!     Box::new(FramingNode::new(2, 4096)),
//! );
//! builder.push_node(
//!     NodeDescriptor {
//!         type_name: "tun_device",
//!         version: 1,
//!         layer_group: LayerGroup::L3,
//!         position: ChainPosition::End,
//!         interface: NodeInterface::PacketTunnel,
//!         required_padding_left: 0,
//!     },
//!     Box::new(TunDevice::new()),
//! );
//! let chain = builder.build().expect("valid chain");
//! let line = chain.on_accept();
//! chain.on_payload(&line, tunnelpipe::sbuf::Sbuf::from_slice(&[0, 3, b'h', b'i', b'!']));
//! ```
//!
//! # Concurrency model
//!
//! A chain and every line that flows through it is owned by exactly one
//! worker; there is no cross-thread sharing within a single chain's
//! dispatch. This is why [`line::Line`] and [`sbuf::Sbuf`] use `Rc` and
//! `Cell`/`RefCell` rather than `Arc` and `Mutex` — a worker pool
//! distributes whole connections across threads, not individual events
//! within one connection's processing.
//!
//! # Error handling
//!
//! Three different things can go wrong, and the engine treats them
//! differently, per [`error`]: a misconfigured chain is rejected at
//! build time with an [`error::EngineError`]; a misbehaving peer (a
//! malformed frame, a length overflow) is handled by the offending
//! node per its own documented policy, typically by dropping state or
//! sending `finish`; and a genuine programming error (dispatching past
//! the end of a chain, calling a stream-only event on a packet-tunnel
//! node) is unrecoverable and the process aborts after logging at
//! `tracing::error!` — these are invariants a correctly built chain
//! cannot hit, not conditions to recover from.

#![forbid(unsafe_code)]

pub mod chain;
pub mod descriptor;
pub mod error;
pub mod line;
pub mod node;
pub mod nodes;
pub mod packet;
pub mod sbuf;
pub mod stream;

pub use chain::{Chain, ChainBuilder};
pub use descriptor::{ChainPosition, LayerGroup, NodeDescriptor, NodeFactory};
pub use error::{EngineError, NodeError};
pub use line::{Line, LineLock};
pub use node::{NodeContext, NodeId, TunnelNode};
pub use packet::{Datagram, NodeInterface};
pub use sbuf::Sbuf;
pub use stream::BufferStream;
