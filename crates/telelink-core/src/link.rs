//! The shared link abstraction.
//!
//! Every transport implements [`Link`] and embeds a [`LinkBase`]. The base
//! carries what upper layers rely on regardless of transport: the link's
//! identity, the sender ids stamped on outgoing frames, I/O counters and the
//! signals through which received messages, closure and errors are reported.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;

use mavlink::common::MavMessage;
use mavlink::{MavHeader, Message as _};

use crate::error::{CodecError, LinkError, Result};
use crate::logging::targets;
use crate::message::{Frame, ProtocolVersion};
use crate::signal::Signal;

/// Process-unique identifier of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// A message delivered by a link, tagged with the link it arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// The link that received the message.
    pub link: LinkId,
    /// The verified frame, header as the sender wrote it.
    pub frame: Frame,
}

/// Snapshot of a link's I/O counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Bytes handed to the socket successfully.
    pub tx_bytes: u64,
    /// Outgoing buffers transmitted completely.
    pub tx_frames: u64,
    /// Outgoing buffers dropped (no peer or send error).
    pub tx_dropped: u64,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Datagrams (or reads) received.
    pub rx_packets: u64,
    /// Messages decoded and delivered.
    pub rx_messages: u64,
    /// Frames rejected by the decoder.
    pub rx_parse_errors: u64,
}

#[derive(Debug, Default)]
struct IoCounters {
    tx_bytes: AtomicU64,
    tx_frames: AtomicU64,
    tx_dropped: AtomicU64,
    rx_bytes: AtomicU64,
    rx_packets: AtomicU64,
    rx_messages: AtomicU64,
    rx_parse_errors: AtomicU64,
}

/// State shared by every transport.
///
/// # Signals
///
/// - [`message_received`](Self::message_received): a message was decoded
/// - [`closed`](Self::closed): the link was closed
/// - [`error`](Self::error): an operation failed in the background
pub struct LinkBase {
    id: LinkId,
    system_id: u8,
    component_id: u8,
    protocol: Mutex<ProtocolVersion>,
    tx_seq: AtomicU8,
    counters: IoCounters,

    /// Signal emitted for every decoded message, in arrival order.
    pub message_received: Signal<ReceivedMessage>,
    /// Signal emitted once when the link is closed.
    pub closed: Signal<()>,
    /// Signal emitted when a background operation fails.
    pub error: Signal<LinkError>,
}

impl LinkBase {
    /// Create a base for a link sending as `system_id`/`component_id`.
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            id: LinkId::next(),
            system_id,
            component_id,
            protocol: Mutex::new(ProtocolVersion::default()),
            tx_seq: AtomicU8::new(0),
            counters: IoCounters::default(),
            message_received: Signal::new(),
            closed: Signal::new(),
            error: Signal::new(),
        }
    }

    /// The link's identifier.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// System id stamped on outgoing messages.
    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    /// Component id stamped on outgoing messages.
    pub fn component_id(&self) -> u8 {
        self.component_id
    }

    /// Protocol version used for outgoing messages.
    pub fn protocol_version(&self) -> ProtocolVersion {
        *self.protocol.lock()
    }

    /// Change the protocol version used for outgoing messages.
    pub fn set_protocol_version(&self, version: ProtocolVersion) {
        *self.protocol.lock() = version;
    }

    /// Stamp a message with this link's identity and next sequence number and encode it.
    ///
    /// The sequence number is only consumed when encoding succeeds.
    pub fn encode(&self, message: &MavMessage) -> Result<Frame> {
        let version = self.protocol_version();
        let id = message.message_id();
        if id > version.max_message_id() {
            return Err(CodecError::MessageIdOutOfRange { id, version }.into());
        }

        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.tx_seq.fetch_add(1, Ordering::Relaxed),
        };
        Ok(Frame::encode(header, message, version)?)
    }

    /// Snapshot of the I/O counters.
    pub fn stats(&self) -> IoStats {
        let c = &self.counters;
        IoStats {
            tx_bytes: c.tx_bytes.load(Ordering::Relaxed),
            tx_frames: c.tx_frames.load(Ordering::Relaxed),
            tx_dropped: c.tx_dropped.load(Ordering::Relaxed),
            rx_bytes: c.rx_bytes.load(Ordering::Relaxed),
            rx_packets: c.rx_packets.load(Ordering::Relaxed),
            rx_messages: c.rx_messages.load(Ordering::Relaxed),
            rx_parse_errors: c.rx_parse_errors.load(Ordering::Relaxed),
        }
    }

    /// Record bytes written to the transport.
    pub fn record_sent(&self, bytes: usize) {
        self.counters.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record an outgoing buffer transmitted completely.
    pub fn record_frame_sent(&self) {
        self.counters.tx_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outgoing buffer that was dropped.
    pub fn record_dropped(&self) {
        self.counters.tx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one datagram/read of `bytes` bytes.
    pub fn record_received(&self, bytes: usize) {
        self.counters.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.counters.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record frames rejected by the decoder.
    pub fn record_parse_errors(&self, count: usize) {
        if count > 0 {
            self.counters
                .rx_parse_errors
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Count a verified frame and hand it to `message_received`.
    pub fn deliver(&self, frame: Frame) {
        self.counters.rx_messages.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(target: targets::LINK, link = %self.id, %frame, "delivering frame");
        self.message_received.emit(ReceivedMessage {
            link: self.id,
            frame,
        });
    }

    /// Report a background failure on the `error` signal.
    pub fn report_error(&self, err: LinkError) {
        self.error.emit(err);
    }
}

impl fmt::Debug for LinkBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkBase")
            .field("id", &self.id)
            .field("system_id", &self.system_id)
            .field("component_id", &self.component_id)
            .field("protocol", &self.protocol_version())
            .field("stats", &self.stats())
            .finish()
    }
}

/// The interface every transport provides.
///
/// Upper layers hold links as `Box<dyn Link>` or `Arc<dyn Link>` and never
/// need to know which transport is underneath.
pub trait Link: Send + Sync {
    /// The shared state: identity, counters, signals.
    fn base(&self) -> &LinkBase;

    /// Acquire the transport's resources and start receiving.
    fn open(&self) -> Result<()>;

    /// Stop all I/O and release resources. Idempotent.
    fn close(&self);

    /// Whether the link is open and its transport still usable.
    fn is_open(&self) -> bool;

    /// Queue raw bytes for transmission.
    fn send_bytes(&self, bytes: &[u8]) -> Result<()>;

    /// Encode a message with this link's identity and queue it.
    fn send_message(&self, message: &MavMessage) -> Result<()> {
        let frame = self.base().encode(message)?;
        self.send_bytes(frame.as_bytes())
    }

    /// Queue a finished frame as is, keeping the sender's header.
    ///
    /// This is the forwarding path: the frame's ids and sequence number are
    /// not replaced and this link's own sequence counter is not touched.
    fn send_raw(&self, frame: &Frame) -> Result<()> {
        self.send_bytes(frame.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameDecoder, MAGIC_V1};
    use mavlink::Message;
    use std::sync::Arc;

    fn message(id: u32) -> MavMessage {
        MavMessage::default_message_from_id(id).unwrap()
    }

    fn frame_from(system_id: u8, sequence: u8) -> Frame {
        let header = MavHeader {
            system_id,
            component_id: 1,
            sequence,
        };
        Frame::encode(header, &message(0), ProtocolVersion::V2).unwrap()
    }

    #[test]
    fn test_link_ids_are_unique() {
        let a = LinkBase::new(1, 1);
        let b = LinkBase::new(1, 1);
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("link-"));
    }

    #[test]
    fn test_encode_stamps_identity_and_sequence() {
        let base = LinkBase::new(42, 7);
        let mut decoder = FrameDecoder::new();

        for expected_seq in 0..3u8 {
            let frame = base.encode(&message(0)).unwrap();
            let decoded = decoder.decode(frame.as_bytes());
            let received = &decoded.frames[0];
            assert_eq!(received.seq(), expected_seq);
            assert_eq!(received.system_id(), 42);
            assert_eq!(received.component_id(), 7);
        }
    }

    #[test]
    fn test_encode_failure_does_not_consume_sequence() {
        let base = LinkBase::new(1, 1);
        base.set_protocol_version(ProtocolVersion::V1);
        assert!(matches!(
            base.encode(&message(300)),
            Err(LinkError::Encode(CodecError::MessageIdOutOfRange { id: 300, .. }))
        ));

        let frame = base.encode(&message(0)).unwrap();
        assert_eq!(frame.seq(), 0);
    }

    #[test]
    fn test_protocol_version_switch() {
        let base = LinkBase::new(1, 1);
        assert_eq!(base.protocol_version(), ProtocolVersion::V2);
        assert!(base.encode(&message(300)).is_ok());

        base.set_protocol_version(ProtocolVersion::V1);
        let frame = base.encode(&message(0)).unwrap();
        assert_eq!(frame.as_bytes()[0], MAGIC_V1);
        assert_eq!(frame.version(), ProtocolVersion::V1);
    }

    #[test]
    fn test_deliver_counts_and_emits() {
        let base = LinkBase::new(1, 1);
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        base.message_received.connect(move |rx| {
            received_clone.lock().push(rx.clone());
        });

        base.deliver(frame_from(5, 10));
        base.deliver(frame_from(6, 11));

        let received = received.lock();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].link, base.id());
        assert_eq!(received[1].frame.system_id(), 6);
        assert_eq!(received[1].frame.seq(), 11);
        assert_eq!(base.stats().rx_messages, 2);
    }

    #[test]
    fn test_counters() {
        let base = LinkBase::new(1, 1);
        base.record_sent(10);
        base.record_frame_sent();
        base.record_dropped();
        base.record_received(20);
        base.record_parse_errors(0);
        base.record_parse_errors(2);

        assert_eq!(
            base.stats(),
            IoStats {
                tx_bytes: 10,
                tx_frames: 1,
                tx_dropped: 1,
                rx_bytes: 20,
                rx_packets: 1,
                rx_messages: 0,
                rx_parse_errors: 2,
            }
        );
    }

    #[test]
    fn test_report_error() {
        let base = LinkBase::new(1, 1);
        let errors = Arc::new(Mutex::new(Vec::new()));

        let errors_clone = errors.clone();
        base.error.connect(move |err| errors_clone.lock().push(err.clone()));
        base.report_error(LinkError::NoPeer(3));

        assert_eq!(*errors.lock(), vec![LinkError::NoPeer(3)]);
    }

    /// Records what the default `Link` methods hand to the transport.
    struct RecordingLink {
        base: LinkBase,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Link for RecordingLink {
        fn base(&self) -> &LinkBase {
            &self.base
        }

        fn open(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) {}

        fn is_open(&self) -> bool {
            true
        }

        fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
            self.sent.lock().push(bytes.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_send_raw_keeps_sender_header() {
        let link = RecordingLink {
            base: LinkBase::new(1, 240),
            sent: Mutex::new(Vec::new()),
        };
        let forwarded = frame_from(99, 123);

        link.send_raw(&forwarded).unwrap();
        link.send_message(&message(0)).unwrap();

        let sent = link.sent.lock();
        assert_eq!(sent[0], forwarded.as_bytes());

        let own = &FrameDecoder::new().decode(&sent[1]).frames[0];
        assert_eq!(own.system_id(), 1);
        assert_eq!(own.component_id(), 240);
        assert_eq!(own.seq(), 0);
    }
}
