//! Core systems for telelink.
//!
//! This crate provides the transport-independent half of a telemetry link:
//!
//! - **Link abstraction**: the [`Link`] trait every transport implements, and
//!   [`LinkBase`] with identity, I/O counters and notification signals
//! - **Signal/Slot System**: [`Signal`] for delivering received frames,
//!   closure and background errors
//! - **Frame Codec**: [`Frame`] and [`FrameDecoder`] on top of the `mavlink`
//!   crate's common dialect
//!
//! # Example
//!
//! ```
//! use telelink_core::{Frame, FrameDecoder, MavHeader, ProtocolVersion};
//! use telelink_core::mavlink::Message;
//! use telelink_core::mavlink::common::MavMessage;
//!
//! let heartbeat = MavMessage::default_message_from_id(0).unwrap();
//! let header = MavHeader { system_id: 1, component_id: 1, sequence: 0 };
//! let frame = Frame::encode(header, &heartbeat, ProtocolVersion::V2).unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! let decoded = decoder.decode(frame.as_bytes());
//! assert_eq!(decoded.frames, vec![frame]);
//! ```

pub mod codec;
mod error;
pub mod link;
pub mod logging;
mod message;
pub mod signal;

pub use codec::{Decoded, FrameDecoder, MAX_PACKET_LEN, MAX_PAYLOAD_LEN};
pub use error::{CodecError, LinkError, Result};
pub use link::{IoStats, Link, LinkBase, LinkId, ReceivedMessage};
pub use mavlink::{self, MavHeader};
pub use mavlink::common::MavMessage;
pub use message::{Frame, ProtocolVersion};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
