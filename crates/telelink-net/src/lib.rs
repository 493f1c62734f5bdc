//! Datagram transport for telelink.
//!
//! This crate provides the UDP implementation of [`Link`]:
//!
//! - **UDP Link**: [`udp::UdpLink`] binds a local endpoint and sends to a
//!   configured remote or to the last peer heard from
//! - **URLs**: [`open_url`] builds and opens a link from a connection URL
//!
//! # Example
//!
//! ```ignore
//! use telelink_net::open_url;
//!
//! let link = open_url("udp://0.0.0.0:14555@", 1, 240)?;
//!
//! link.base().message_received.connect(|rx| {
//!     println!("received {}", rx.frame);
//! });
//! ```
//!
//! # Threading
//!
//! Every open link owns one I/O thread. Received messages, the `closed`
//! signal after a socket failure, and send errors are all emitted on it.
//! Slots must not block for long: the next datagram is not read until they
//! return.

pub mod udp;

pub use telelink_core::{
    Frame, Link, LinkBase, LinkError, MavMessage, ProtocolVersion, ReceivedMessage, Result,
};

use udp::{UdpLink, UdpLinkConfig};

/// Create and open a link from a URL.
///
/// Only `udp://[bind_host][:port]@[remote_host][:port]` is supported. An
/// `ids=sys,comp` query parameter overrides `system_id` and `component_id`.
///
/// The returned link is already open.
pub fn open_url(url: &str, system_id: u8, component_id: u8) -> Result<Box<dyn Link>> {
    let config = UdpLinkConfig::from_url(url)?;
    let (system_id, component_id) = match query_ids(url)? {
        Some(ids) => ids,
        None => (system_id, component_id),
    };

    let link = UdpLink::with_ids(system_id, component_id, config);
    link.open()?;
    Ok(Box::new(link))
}

/// Parse the `ids=sys,comp` query parameter, if present.
fn query_ids(url: &str) -> Result<Option<(u8, u8)>> {
    let Some((_, query)) = url.split_once('?') else {
        return Ok(None);
    };
    let Some(value) = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("ids="))
    else {
        return Ok(None);
    };

    let invalid = || LinkError::InvalidUrl {
        url: url.to_string(),
        message: format!("invalid ids '{value}'"),
    };
    let (sys, comp) = value.split_once(',').ok_or_else(invalid)?;
    let sys = sys.trim().parse().map_err(|_| invalid())?;
    let comp = comp.trim().parse().map_err(|_| invalid())?;
    Ok(Some((sys, comp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_ids() {
        assert_eq!(query_ids("udp://:14555@").unwrap(), None);
        assert_eq!(query_ids("udp://:14555@?ids=3,190").unwrap(), Some((3, 190)));
        assert_eq!(query_ids("udp://@?foo=1&ids=7,1").unwrap(), Some((7, 1)));
        assert_eq!(query_ids("udp://@?foo=1").unwrap(), None);
    }

    #[test]
    fn test_query_ids_invalid() {
        assert!(matches!(
            query_ids("udp://@?ids=300,1"),
            Err(LinkError::InvalidUrl { .. })
        ));
        assert!(matches!(
            query_ids("udp://@?ids=1"),
            Err(LinkError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_open_url_rejects_other_schemes() {
        assert!(matches!(
            open_url("serial:///dev/ttyUSB0:57600", 1, 1),
            Err(LinkError::UnsupportedUrl(scheme)) if scheme == "serial"
        ));
    }
}
