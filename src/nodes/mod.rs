//! Reference node implementations exercising the engine's contracts
//! end-to-end: a TCP-stream framing node, a stream multiplexer, an
//! IP-header rewriter, and a minimal TUN-device stand-in used to
//! anchor the packet-tunnel interface in tests. These are illustrative
//! implementations, not production transports — none of them open a
//! real socket or device file.

pub mod framing;
pub mod ip_manip;
pub mod mux;
pub mod tun;
