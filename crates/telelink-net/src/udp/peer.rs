//! Remote endpoint tracking.

use std::net::SocketAddr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use telelink_core::logging::targets;

/// Decides where outgoing datagrams go.
///
/// A configured remote always wins. Without one, the source of the most
/// recent datagram is used; it stays in place until a newer datagram
/// replaces it.
#[derive(Debug, Default)]
pub struct PeerResolver {
    configured: OnceLock<SocketAddr>,
    learned: Mutex<Option<SocketAddr>>,
}

impl PeerResolver {
    /// Create a resolver with no known peer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the remote endpoint. Only the first call has an effect.
    pub(crate) fn set_configured(&self, addr: SocketAddr) {
        let _ = self.configured.set(addr);
    }

    /// The configured remote endpoint, if any.
    pub fn configured(&self) -> Option<SocketAddr> {
        self.configured.get().copied()
    }

    /// The last observed sender, if any.
    pub fn learned(&self) -> Option<SocketAddr> {
        *self.learned.lock()
    }

    /// Record the source of a received datagram. Returns `true` if it changed.
    pub fn observe(&self, source: SocketAddr) -> bool {
        let previous = self.learned.lock().replace(source);
        let changed = previous != Some(source);
        if changed {
            tracing::info!(target: targets::UDP, %source, "remote address learned");
        }
        changed
    }

    /// Where the next datagram should be sent.
    pub fn current_destination(&self) -> Option<SocketAddr> {
        self.configured().or_else(|| self.learned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_no_destination_initially() {
        let peer = PeerResolver::new();
        assert_eq!(peer.current_destination(), None);
    }

    #[test]
    fn test_learned_last_writer_wins() {
        let peer = PeerResolver::new();
        assert!(peer.observe(addr("192.168.1.5:55000")));
        assert_eq!(peer.current_destination(), Some(addr("192.168.1.5:55000")));

        assert!(!peer.observe(addr("192.168.1.5:55000")));
        assert!(peer.observe(addr("192.168.1.6:55001")));
        assert_eq!(peer.current_destination(), Some(addr("192.168.1.6:55001")));
    }

    #[test]
    fn test_configured_overrides_learned() {
        let peer = PeerResolver::new();
        peer.set_configured(addr("127.0.0.1:14550"));
        peer.observe(addr("10.0.0.1:1234"));

        assert_eq!(peer.current_destination(), Some(addr("127.0.0.1:14550")));
        assert_eq!(peer.learned(), Some(addr("10.0.0.1:1234")));

        peer.set_configured(addr("127.0.0.1:9999"));
        assert_eq!(peer.configured(), Some(addr("127.0.0.1:14550")));
    }
}
