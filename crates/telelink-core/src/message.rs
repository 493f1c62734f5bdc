//! Protocol versions and validated frames.

use std::fmt;

use mavlink::common::MavMessage;
use mavlink::{MavHeader, MavlinkVersion, Message as _};

use crate::error::CodecError;

/// Wire protocol revision used when encoding outgoing messages.
///
/// Decoding always accepts both revisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Version 1 framing: 8-bit message ids, `0xFE` start marker.
    V1,
    /// Version 2 framing: 24-bit message ids, `0xFD` start marker.
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Largest message id this revision can carry.
    pub fn max_message_id(self) -> u32 {
        match self {
            ProtocolVersion::V1 => 0xFF,
            ProtocolVersion::V2 => 0x00FF_FFFF,
        }
    }
}

impl From<ProtocolVersion> for MavlinkVersion {
    fn from(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::V1 => MavlinkVersion::V1,
            ProtocolVersion::V2 => MavlinkVersion::V2,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "v1.0"),
            ProtocolVersion::V2 => write!(f, "v2.0"),
        }
    }
}

/// A complete frame whose checksum has been verified.
///
/// Frames are what links deliver and what they forward unchanged: the
/// sender's header (`seq`, `system_id`, `component_id`) is kept as it was
/// on the wire. Build one with [`Frame::encode`] or get one from a
/// [`FrameDecoder`](crate::FrameDecoder).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame {
    pub(crate) version: ProtocolVersion,
    pub(crate) seq: u8,
    pub(crate) system_id: u8,
    pub(crate) component_id: u8,
    pub(crate) message_id: u32,
    pub(crate) payload: Vec<u8>,
    pub(crate) bytes: Vec<u8>,
}

impl Frame {
    /// Serialize `message` under `header` with the given framing.
    ///
    /// Fails if the message id does not fit `version`.
    pub fn encode(
        header: MavHeader,
        message: &MavMessage,
        version: ProtocolVersion,
    ) -> Result<Self, CodecError> {
        crate::codec::encode_frame(header, message, version)
    }

    /// Framing revision the frame arrived in.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Sender's packet sequence number.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Sending system id.
    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    /// Sending component id.
    pub fn component_id(&self) -> u8 {
        self.component_id
    }

    /// Message id.
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Payload bytes as carried on the wire.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The full frame, start marker to checksum.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The sender's header.
    pub fn header(&self) -> MavHeader {
        MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.seq,
        }
    }

    /// Parse the payload as a message of the common dialect.
    pub fn decode(&self) -> Result<MavMessage, CodecError> {
        MavMessage::parse(self.version.into(), self.message_id, &self.payload).map_err(|err| {
            CodecError::Parse {
                id: self.message_id,
                message: err.to_string(),
            }
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "msg#{} seq={} from {}.{} ({} bytes)",
            self.message_id,
            self.seq,
            self.system_id,
            self.component_id,
            self.payload.len()
        )
    }
}
