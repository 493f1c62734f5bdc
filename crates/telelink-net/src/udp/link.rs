//! UDP link with peer discovery.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use telelink_core::logging::targets;
use telelink_core::{Link, LinkBase, LinkError, Result};

use super::config::{UdpLinkConfig, resolve_ipv4};
use super::driver::{IoDriver, Shared};
use super::state::UdpLinkState;

/// System id used when none is given.
pub const DEFAULT_SYSTEM_ID: u8 = 1;
/// Component id used when none is given (UDP bridge).
pub const DEFAULT_COMPONENT_ID: u8 = 240;

/// Internal state for the UDP link.
struct UdpLinkInner {
    state: UdpLinkState,
    local_addr: Option<SocketAddr>,
    driver: Option<IoDriver>,
}

/// A UDP transport implementing [`Link`].
///
/// The link binds a local endpoint and sends to either a configured remote or,
/// when no remote host is configured, to whoever sent the most recent
/// datagram. Sends never block: buffers are queued and written in order by
/// the link's I/O thread.
///
/// Received messages are reported on the base's
/// [`message_received`](LinkBase::message_received) signal, on the I/O thread.
///
/// # Example
///
/// ```ignore
/// use telelink_core::{Link, MavMessage};
/// use telelink_core::mavlink::Message;
/// use telelink_net::udp::{UdpLink, UdpLinkConfig};
///
/// let link = UdpLink::new(UdpLinkConfig::new("0.0.0.0", 14555));
///
/// link.base().message_received.connect(|rx| {
///     println!("{} on {}", rx.frame, rx.link);
/// });
///
/// link.open()?;
/// link.send_message(&MavMessage::default_message_from_id(0)?)?;
/// ```
pub struct UdpLink {
    config: UdpLinkConfig,
    shared: Arc<Shared>,
    inner: Mutex<UdpLinkInner>,
}

impl UdpLink {
    /// Create a link with the default sender ids.
    pub fn new(config: UdpLinkConfig) -> Self {
        Self::with_ids(DEFAULT_SYSTEM_ID, DEFAULT_COMPONENT_ID, config)
    }

    /// Create a link sending as `system_id`/`component_id`.
    pub fn with_ids(system_id: u8, component_id: u8, config: UdpLinkConfig) -> Self {
        Self::with_base(LinkBase::new(system_id, component_id), config)
    }

    /// Create a link around a prepared base (for a different protocol version).
    pub fn with_base(base: LinkBase, config: UdpLinkConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new(base)),
            inner: Mutex::new(UdpLinkInner {
                state: UdpLinkState::Constructed,
                local_addr: None,
                driver: None,
            }),
        }
    }

    /// The link's configuration.
    pub fn config(&self) -> &UdpLinkConfig {
        &self.config
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> UdpLinkState {
        self.inner.lock().state
    }

    /// Get the bound local address. `None` unless open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().local_addr
    }

    /// Where the next datagram will be sent, if anywhere.
    pub fn current_destination(&self) -> Option<SocketAddr> {
        self.shared.peer.current_destination()
    }

    /// The configured remote endpoint, resolved at open.
    pub fn configured_peer(&self) -> Option<SocketAddr> {
        self.shared.peer.configured()
    }

    /// The last sender seen on this link.
    pub fn learned_peer(&self) -> Option<SocketAddr> {
        self.shared.peer.learned()
    }

    /// Number of buffers waiting to be sent.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }
}

impl Link for UdpLink {
    fn base(&self) -> &LinkBase {
        &self.shared.base
    }

    fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            UdpLinkState::Open => return Err(LinkError::AlreadyOpen),
            UdpLinkState::Closed => return Err(LinkError::Closed),
            UdpLinkState::Constructed => {}
        }

        let bind_error = |err: std::io::Error| LinkError::Bind {
            endpoint: self.config.bind_addr(),
            message: err.to_string(),
        };
        let bind_addr =
            resolve_ipv4(&self.config.bind_host, self.config.bind_port).map_err(bind_error)?;

        if let Some(endpoint) = self.config.remote_addr() {
            let remote = resolve_ipv4(&self.config.remote_host, self.config.remote_port)
                .map_err(|err| LinkError::Resolve {
                    endpoint,
                    message: err.to_string(),
                })?;
            self.shared.peer.set_configured(remote);
            tracing::info!(target: targets::UDP, link = %self.shared.base.id(), %remote, "remote address configured");
        }

        let socket = std::net::UdpSocket::bind(bind_addr).map_err(bind_error)?;
        let local_addr = socket.local_addr()?;

        self.shared.mark_alive();
        let driver = match IoDriver::start(socket, &self.shared) {
            Ok(driver) => driver,
            Err(err) => {
                self.shared.mark_dead();
                return Err(err.into());
            }
        };

        inner.state = UdpLinkState::Open;
        inner.local_addr = Some(local_addr);
        inner.driver = Some(driver);
        tracing::info!(target: targets::UDP, link = %self.shared.base.id(), %local_addr, "link open");
        Ok(())
    }

    fn close(&self) {
        let driver = {
            let mut inner = self.inner.lock();
            if inner.state == UdpLinkState::Closed {
                return;
            }
            inner.state = UdpLinkState::Closed;
            inner.local_addr = None;
            inner.driver.take()
        };

        let was_alive = self.shared.mark_dead();
        let discarded = self.shared.queue.close();
        if let Some(driver) = driver {
            driver.stop(&self.shared);
        }

        if was_alive {
            tracing::info!(target: targets::UDP, link = %self.shared.base.id(), discarded, "link closed");
            self.shared.base.closed.emit(());
        }
    }

    fn is_open(&self) -> bool {
        self.state() == UdpLinkState::Open && self.shared.is_alive()
    }

    fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        self.shared.enqueue(Bytes::copy_from_slice(bytes))
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UdpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpLink")
            .field("id", &self.shared.base.id())
            .field("bind_addr", &self.config.bind_addr())
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("destination", &self.current_destination())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_socket_failure_kills_link_once() {
        let link = UdpLink::new(UdpLinkConfig::new("127.0.0.1", 0));
        link.open().unwrap();

        let closed = Arc::new(AtomicUsize::new(0));
        let closed_clone = closed.clone();
        link.base().closed.connect(move |_| {
            closed_clone.fetch_add(1, Ordering::SeqCst);
        });
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        link.base().error.connect(move |err| {
            errors_clone.lock().push(err.clone());
        });

        let failure = LinkError::Io("receive: socket gone".into());
        link.shared.fail(failure.clone());
        link.shared.fail(LinkError::Io("receive: again".into()));

        assert!(!link.is_open());
        assert_eq!(link.send_bytes(b"after"), Err(LinkError::Closed));
        assert_eq!(link.queue_len(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(errors.lock().as_slice(), &[failure]);

        link.close();
        assert_eq!(link.state(), UdpLinkState::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
