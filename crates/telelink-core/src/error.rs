//! Error types for telelink links.

use crate::message::ProtocolVersion;

/// Frame encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The message id cannot be represented in the chosen protocol version.
    #[error("message id {id} does not fit protocol {version}")]
    MessageIdOutOfRange {
        /// The offending message id.
        id: u32,
        /// Protocol version used for encoding.
        version: ProtocolVersion,
    },
    /// The message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Write(String),
    /// A frame's payload is not a valid message of the dialect.
    #[error("failed to parse msg#{id}: {message}")]
    Parse {
        /// Message id of the frame.
        id: u32,
        /// Cause reported by the dialect parser.
        message: String,
    },
}

/// Link errors.
///
/// Cloneable so it can be delivered through [`Signal`](crate::Signal).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The local endpoint could not be bound.
    #[error("failed to bind {endpoint}: {message}")]
    Bind {
        /// The endpoint as configured (`host:port`).
        endpoint: String,
        /// Cause reported by the OS or resolver.
        message: String,
    },
    /// The remote host could not be resolved.
    #[error("failed to resolve {endpoint}: {message}")]
    Resolve {
        /// The endpoint as configured (`host:port`).
        endpoint: String,
        /// Cause reported by the resolver.
        message: String,
    },
    /// `open()` was called on a link that is already open.
    #[error("link is already open")]
    AlreadyOpen,
    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] CodecError),
    /// The link is closed or its socket is no longer usable.
    #[error("link is closed")]
    Closed,
    /// There is no destination to send to yet.
    #[error("no remote peer known, dropping {0} bytes")]
    NoPeer(usize),
    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(String),
    /// The URL names a transport this crate does not provide.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedUrl(String),
    /// The URL could not be parsed.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// What is wrong with it.
        message: String,
    },
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// A specialized Result type for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
