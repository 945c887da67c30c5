//! Binary Packet Protocol
//!
//! The length-prefixed wire format multiplexed over the client's poll
//! requests: primitive codec, the packet id table, compound structures,
//! and the server->client packet builders.

pub mod codec;
pub mod ids;
pub mod server;
pub mod structures;

pub use codec::{FrameIter, ProtocolError, Reader, Writer, HEADER_SIZE};
pub use ids::PacketId;
