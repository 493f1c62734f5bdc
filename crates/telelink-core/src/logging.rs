//! Logging facilities for telelink.
//!
//! telelink uses the `tracing` crate for instrumentation. The library never
//! installs a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!     // ...
//! }
//! ```
//!
//! Every event carries one of the [`targets`] below, so a filter such as
//! `telelink_net::udp=debug` narrows output to a single subsystem.

/// Target names for log filtering.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "telelink_core::signal";
    /// Frame codec target.
    pub const CODEC: &str = "telelink_core::codec";
    /// Shared link bookkeeping target.
    pub const LINK: &str = "telelink_core::link";
    /// UDP transport target.
    pub const UDP: &str = "telelink_net::udp";
}
