//! The I/O thread behind a UDP link.
//!
//! Each open link owns one named thread running a current-thread tokio
//! runtime. The thread drives the receive loop; send drains are spawned onto
//! the same runtime through its handle. Receive handling (including message
//! callbacks) and send completions therefore never run at the same time.
//!
//! Shutdown is a oneshot: the thread leaves `block_on`, drops the runtime
//! (cancelling an in-flight drain) and exits.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use parking_lot::Mutex;
use telelink_core::logging::targets;
use telelink_core::{FrameDecoder, LinkBase, LinkError, MAX_PACKET_LEN, Result};
use tokio::net::UdpSocket;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use super::peer::PeerResolver;
use super::queue::OutgoingQueue;

/// Where drains are spawned and what they write to.
struct IoHandle {
    runtime: Handle,
    socket: Arc<UdpSocket>,
}

/// State shared between a link handle and its I/O thread.
pub(crate) struct Shared {
    pub(crate) base: LinkBase,
    pub(crate) queue: OutgoingQueue,
    pub(crate) peer: PeerResolver,
    alive: AtomicBool,
    io: Mutex<Option<IoHandle>>,
}

impl Shared {
    pub(crate) fn new(base: LinkBase) -> Self {
        Self {
            base,
            queue: OutgoingQueue::new(),
            peer: PeerResolver::new(),
            alive: AtomicBool::new(false),
            io: Mutex::new(None),
        }
    }

    /// Whether the socket is still usable.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Mark the socket unusable. Returns `true` for the call that did so.
    pub(crate) fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Queue bytes, starting a drain on the I/O thread if none is running.
    pub(crate) fn enqueue(self: &Arc<Self>, data: Bytes) -> Result<()> {
        self.queue.push(data, || self.spawn_drain())
    }

    fn spawn_drain(self: &Arc<Self>) {
        match self.io.lock().as_ref() {
            Some(io) => {
                io.runtime.spawn(drain_queue(self.clone(), io.socket.clone()));
            }
            None => {
                tracing::debug!(target: targets::UDP, link = %self.base.id(), "no I/O thread, buffer stays queued until close");
            }
        }
    }

    /// Mark dead after a fatal socket error and tell the owner.
    pub(crate) fn fail(&self, err: LinkError) {
        if self.mark_dead() {
            let discarded = self.queue.close();
            tracing::error!(target: targets::UDP, link = %self.base.id(), error = %err, discarded, "socket failed, link is dead");
            self.base.report_error(err);
            self.base.closed.emit(());
        }
    }
}

/// Handle to a running I/O thread.
pub(crate) struct IoDriver {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl IoDriver {
    /// Take ownership of a bound socket and start receiving on a new thread.
    pub(crate) fn start(socket: std::net::UdpSocket, shared: &Arc<Shared>) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let socket = {
            let _guard = runtime.enter();
            Arc::new(UdpSocket::from_std(socket)?)
        };

        let handle = runtime.handle().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let thread_shared = shared.clone();
        let thread_socket = socket.clone();
        let thread = thread::Builder::new()
            .name(format!("telelink-udp-{}", shared.base.id().as_u64()))
            .spawn(move || {
                runtime.block_on(async {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx => {}
                        _ = receive_loop(thread_shared.clone(), thread_socket) => {}
                    }
                });
                drop(runtime);
                tracing::debug!(target: targets::UDP, link = %thread_shared.base.id(), "I/O thread stopped");
            })?;

        *shared.io.lock() = Some(IoHandle {
            runtime: handle,
            socket,
        });

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Stop the I/O thread and wait for it to exit.
    ///
    /// Called from the I/O thread itself (from inside a message callback), the
    /// join is skipped; the thread exits as soon as the callback returns.
    pub(crate) fn stop(mut self, shared: &Shared) {
        shared.io.lock().take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            tracing::debug!(target: targets::UDP, link = %shared.base.id(), "close called on the I/O thread, not joining");
            return;
        }
        if thread.join().is_err() {
            tracing::error!(target: targets::UDP, link = %shared.base.id(), "I/O thread panicked");
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Receive datagrams until shutdown or a fatal socket error.
///
/// `rx_buf` is reused for every datagram. Frames are delivered in arrival
/// order before the next receive is issued.
async fn receive_loop(shared: Arc<Shared>, socket: Arc<UdpSocket>) {
    let base = &shared.base;
    let mut rx_buf = [0u8; MAX_PACKET_LEN];
    let mut decoder = FrameDecoder::new();

    loop {
        let (len, source) = match socket.recv_from(&mut rx_buf).await {
            Ok(received) => received,
            Err(err) if is_transient(&err) => {
                tracing::warn!(target: targets::UDP, link = %base.id(), error = %err, "receive failed, retrying");
                continue;
            }
            Err(err) => {
                shared.fail(LinkError::Io(format!("receive: {err}")));
                return;
            }
        };
        if !shared.is_alive() {
            return;
        }

        tracing::trace!(target: targets::UDP, link = %base.id(), %source, len, "datagram received");
        shared.peer.observe(source);
        base.record_received(len);

        let decoded = decoder.decode(&rx_buf[..len]);
        base.record_parse_errors(decoded.parse_errors);
        for frame in decoded.frames {
            if !shared.is_alive() {
                return;
            }
            base.deliver(frame);
        }
    }
}

/// Send queued buffers until the queue is empty.
///
/// A buffer with no destination, or whose send fails, is dropped and the
/// drain moves on to the next one.
async fn drain_queue(shared: Arc<Shared>, socket: Arc<UdpSocket>) {
    let base = &shared.base;

    while let Some(chunk) = shared.queue.next_chunk() {
        let Some(destination) = shared.peer.current_destination() else {
            drop_head(&shared, LinkError::NoPeer(chunk.len()));
            continue;
        };

        match socket.send_to(&chunk, destination).await {
            Ok(0) if !chunk.is_empty() => {
                let err = LinkError::Io(format!("send to {destination}: zero bytes written"));
                drop_head(&shared, err);
            }
            Ok(written) => {
                tracing::trace!(target: targets::UDP, link = %base.id(), %destination, written, "datagram sent");
                base.record_sent(written);
                if shared.queue.advance(written) {
                    base.record_frame_sent();
                }
            }
            Err(err) => {
                drop_head(&shared, send_error(destination, &err));
            }
        }
    }
}

fn send_error(destination: SocketAddr, err: &io::Error) -> LinkError {
    LinkError::Io(format!("send to {destination}: {err}"))
}

fn drop_head(shared: &Shared, err: LinkError) {
    if shared.queue.drop_head().is_some() {
        shared.base.record_dropped();
    }
    tracing::warn!(target: targets::UDP, link = %shared.base.id(), error = %err, "dropping outgoing buffer");
    shared.base.report_error(err);
}
