//! Frame encoding and decoding.
//!
//! Serialization, checksums and the per-message `crc_extra` byte all come
//! from the `mavlink` crate and its common dialect. This module adds what a
//! datagram link needs on top: finding frame boundaries in arbitrary chunks,
//! carrying a partial frame over to the next chunk, and counting rejects.
//!
//! [`FrameDecoder`] scans for a start marker, waits until the whole
//! candidate is buffered, hands exactly that candidate to the `mavlink` raw
//! reader and checks its CRC. A candidate that fails is counted, and the scan
//! resumes one byte later.

use mavlink::common::MavMessage;
use mavlink::peek_reader::PeekReader;
use mavlink::{MAVLinkV1MessageRaw, MAVLinkV2MessageRaw, MavHeader, Message as _};

use crate::error::CodecError;
use crate::logging::targets;
use crate::message::{Frame, ProtocolVersion};

/// Start marker of a v1 frame.
pub const MAGIC_V1: u8 = 0xFE;
/// Start marker of a v2 frame.
pub const MAGIC_V2: u8 = 0xFD;
/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 255;
/// Largest possible frame on the wire (signed v2 frame with a full payload).
pub const MAX_PACKET_LEN: usize = 280;

pub(crate) fn encode_frame(
    header: MavHeader,
    message: &MavMessage,
    version: ProtocolVersion,
) -> Result<Frame, CodecError> {
    let id = message.message_id();
    if id > version.max_message_id() {
        return Err(CodecError::MessageIdOutOfRange { id, version });
    }

    let mut bytes = Vec::with_capacity(MAX_PACKET_LEN);
    mavlink::write_versioned_msg(&mut bytes, version.into(), header, message)
        .map_err(|err| CodecError::Write(err.to_string()))?;

    read_frame(&bytes).ok_or_else(|| CodecError::Write(format!("msg#{id} did not round-trip")))
}

enum Read {
    Frame(Frame),
    Incomplete,
    Reject,
}

// Header bytes after the start marker.
const V1_HEADER_LEN: usize = 5;
const V2_HEADER_LEN: usize = 9;
const V2_SIGNATURE_LEN: usize = 13;
const V2_INCOMPAT_SIGNED: u8 = 0x01;

/// Wire length of the candidate at the start of `bytes`, once enough of the
/// header is there to tell.
fn candidate_len(bytes: &[u8]) -> Option<usize> {
    let payload_len = usize::from(*bytes.get(1)?);
    if bytes[0] == MAGIC_V1 {
        return Some(1 + V1_HEADER_LEN + payload_len + 2);
    }
    let signature_len = if bytes.get(2)? & V2_INCOMPAT_SIGNED != 0 {
        V2_SIGNATURE_LEN
    } else {
        0
    };
    Some(1 + V2_HEADER_LEN + payload_len + 2 + signature_len)
}

/// Read the candidate frame at the start of `bytes`, which begins with a start marker.
///
/// The reader only ever sees this one candidate, so a bad checksum cannot
/// make it skip ahead into the next frame.
fn read_candidate(bytes: &[u8]) -> Read {
    let Some(len) = candidate_len(bytes) else {
        return Read::Incomplete;
    };
    let Some(candidate) = bytes.get(..len) else {
        return Read::Incomplete;
    };

    let mut reader: PeekReader<&[u8]> = PeekReader::new(candidate);
    let raw = if candidate[0] == MAGIC_V1 {
        mavlink::read_v1_raw_message::<MavMessage, _>(&mut reader).map(Raw::V1)
    } else {
        mavlink::read_v2_raw_message::<MavMessage, _>(&mut reader).map(Raw::V2)
    };

    match raw {
        Ok(raw) if raw.has_valid_crc() && raw.len() == len => Read::Frame(raw.into_frame()),
        _ => Read::Reject,
    }
}

fn read_frame(bytes: &[u8]) -> Option<Frame> {
    match read_candidate(bytes) {
        Read::Frame(frame) => Some(frame),
        Read::Incomplete | Read::Reject => None,
    }
}

enum Raw {
    V1(MAVLinkV1MessageRaw),
    V2(MAVLinkV2MessageRaw),
}

impl Raw {
    fn len(&self) -> usize {
        match self {
            Raw::V1(raw) => raw.raw_bytes().len(),
            Raw::V2(raw) => raw.raw_bytes().len(),
        }
    }

    fn has_valid_crc(&self) -> bool {
        match self {
            Raw::V1(raw) => raw.has_valid_crc::<MavMessage>(),
            Raw::V2(raw) => raw.has_valid_crc::<MavMessage>(),
        }
    }

    fn into_frame(self) -> Frame {
        match self {
            Raw::V1(raw) => Frame {
                version: ProtocolVersion::V1,
                seq: raw.sequence(),
                system_id: raw.system_id(),
                component_id: raw.component_id(),
                message_id: u32::from(raw.message_id()),
                payload: raw.payload().to_vec(),
                bytes: raw.raw_bytes().to_vec(),
            },
            Raw::V2(raw) => Frame {
                version: ProtocolVersion::V2,
                seq: raw.sequence(),
                system_id: raw.system_id(),
                component_id: raw.component_id(),
                message_id: raw.message_id(),
                payload: raw.payload().to_vec(),
                bytes: raw.raw_bytes().to_vec(),
            },
        }
    }
}

/// Result of feeding one chunk of bytes to a [`FrameDecoder`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Complete frames, in stream order.
    pub frames: Vec<Frame>,
    /// Candidate frames rejected for a bad checksum.
    pub parse_errors: usize,
}

/// Incremental decoder carrying partial frames across calls.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder with nothing pending.
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_PACKET_LEN),
        }
    }

    /// Number of bytes held back waiting for the rest of a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Feed bytes and collect every frame they complete.
    pub fn decode(&mut self, bytes: &[u8]) -> Decoded {
        self.pending.extend_from_slice(bytes);
        let mut decoded = Decoded::default();

        loop {
            match self.pending.iter().position(|&b| b == MAGIC_V1 || b == MAGIC_V2) {
                Some(0) => {}
                Some(start) => {
                    tracing::trace!(target: targets::CODEC, skipped = start, "skipping bytes before start marker");
                    self.pending.drain(..start);
                }
                None => {
                    self.pending.clear();
                    break;
                }
            }

            match read_candidate(&self.pending) {
                Read::Incomplete => break,
                Read::Reject => {
                    tracing::debug!(target: targets::CODEC, "frame rejected, resyncing");
                    decoded.parse_errors += 1;
                    self.pending.drain(..1);
                }
                Read::Frame(frame) => {
                    self.pending.drain(..frame.bytes.len());
                    decoded.frames.push(frame);
                }
            }
        }

        decoded
    }
}
