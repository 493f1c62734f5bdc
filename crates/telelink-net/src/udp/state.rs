//! State enumerations for UDP links.

/// Lifecycle state of a UDP link.
///
/// `Constructed → Open → Closed`. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UdpLinkState {
    /// Link created, socket not bound yet.
    #[default]
    Constructed,
    /// Socket bound and I/O thread running.
    Open,
    /// Link closed; no further I/O.
    Closed,
}

impl std::fmt::Display for UdpLinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UdpLinkState::Constructed => write!(f, "Constructed"),
            UdpLinkState::Open => write!(f, "Open"),
            UdpLinkState::Closed => write!(f, "Closed"),
        }
    }
}
