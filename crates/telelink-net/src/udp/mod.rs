//! UDP link with remote peer discovery.
//!
//! This module provides the datagram transport:
//! - **UdpLink**: A [`Link`](telelink_core::Link) over a bound UDP socket
//! - **PeerResolver**: Chooses where outgoing datagrams go
//!
//! # Example
//!
//! ```ignore
//! use telelink_core::Link;
//! use telelink_net::udp::{UdpLink, UdpLinkConfig};
//!
//! // Listen on 14555 and answer whoever talks to us
//! let link = UdpLink::new(UdpLinkConfig::new("0.0.0.0", 14555));
//!
//! link.base().message_received.connect(|rx| {
//!     println!("{} from link {}", rx.frame, rx.link);
//! });
//!
//! link.open()?;
//! ```
//!
//! # Fixed Remote Example
//!
//! ```ignore
//! let config = UdpLinkConfig::new("0.0.0.0", 0).remote("192.168.1.10", 14550);
//!
//! let link = UdpLink::new(config);
//! link.open()?;
//!
//! // Sent immediately, no need to hear from the peer first
//! link.send_bytes(&frame)?;
//! ```

mod config;
mod driver;
mod link;
mod peer;
mod queue;
mod state;

pub use config::{
    DEFAULT_BIND_HOST, DEFAULT_BIND_PORT, DEFAULT_REMOTE_HOST, DEFAULT_REMOTE_PORT, UdpLinkConfig,
};
pub use link::{DEFAULT_COMPONENT_ID, DEFAULT_SYSTEM_ID, UdpLink};
pub use peer::PeerResolver;
pub use state::UdpLinkState;
