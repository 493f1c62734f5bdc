//! Outgoing buffer queue with a single-flight drain.
//!
//! The buffers, the `in_flight` flag and the `closed` flag share one mutex.
//! `push` marks the queue in flight and starts a drain while still holding
//! the lock; `next_chunk` clears the flag under the same lock once the queue
//! is empty. An enqueue therefore either sees a running drain that will pick
//! its buffer up, or starts one itself. At most one drain exists at a time.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use telelink_core::{LinkError, Result};

/// A buffer waiting for transmission.
#[derive(Debug)]
struct PendingSend {
    data: Bytes,
    written: usize,
}

impl PendingSend {
    fn remaining(&self) -> Bytes {
        self.data.slice(self.written..)
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    buffers: VecDeque<PendingSend>,
    in_flight: bool,
    closed: bool,
}

/// FIFO of outgoing buffers.
#[derive(Debug, Default)]
pub(crate) struct OutgoingQueue {
    inner: Mutex<QueueInner>,
}

impl OutgoingQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a buffer. If no drain is in flight, mark one and call `start`
    /// before the lock is released.
    pub(crate) fn push(&self, data: Bytes, start: impl FnOnce()) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(LinkError::Closed);
        }
        inner.buffers.push_back(PendingSend { data, written: 0 });
        if !inner.in_flight {
            inner.in_flight = true;
            start();
        }
        Ok(())
    }

    /// The unsent part of the head buffer.
    ///
    /// Returns `None` and ends the drain (clears `in_flight`) when the queue
    /// is empty or closed.
    pub(crate) fn next_chunk(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let chunk = if inner.closed {
            None
        } else {
            inner.buffers.front().map(PendingSend::remaining)
        };
        if chunk.is_none() {
            inner.in_flight = false;
        }
        chunk
    }

    /// Record `written` bytes of the head as sent.
    ///
    /// Returns `true` if the head buffer is now complete and was removed.
    pub(crate) fn advance(&self, written: usize) -> bool {
        let mut inner = self.inner.lock();
        let Some(head) = inner.buffers.front_mut() else {
            return false;
        };
        head.written = (head.written + written).min(head.data.len());
        if head.written == head.data.len() {
            inner.buffers.pop_front();
            true
        } else {
            false
        }
    }

    /// Discard the head buffer, returning its unsent length.
    pub(crate) fn drop_head(&self) -> Option<usize> {
        self.inner
            .lock()
            .buffers
            .pop_front()
            .map(|head| head.data.len() - head.written)
    }

    /// Reject further pushes and discard everything queued.
    ///
    /// Returns the number of buffers discarded.
    pub(crate) fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.in_flight = false;
        let discarded = inner.buffers.len();
        inner.buffers.clear();
        discarded
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    #[cfg(test)]
    pub(crate) fn is_in_flight(&self) -> bool {
        self.inner.lock().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn drain_all(queue: &OutgoingQueue) -> Vec<Bytes> {
        let mut sent = Vec::new();
        while let Some(chunk) = queue.next_chunk() {
            queue.advance(chunk.len());
            sent.push(chunk);
        }
        sent
    }

    #[test]
    fn test_first_push_starts_drain() {
        let queue = OutgoingQueue::new();
        let starts = AtomicUsize::new(0);

        let start = || {
            starts.fetch_add(1, Ordering::SeqCst);
        };
        queue.push(Bytes::from_static(b"a"), start).unwrap();
        queue.push(Bytes::from_static(b"b"), start).unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(queue.is_in_flight());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drain_is_fifo_and_ends_idle() {
        let queue = OutgoingQueue::new();
        for i in 0..5u8 {
            queue.push(Bytes::from(vec![i]), || {}).unwrap();
        }

        let sent = drain_all(&queue);
        assert_eq!(sent, (0..5u8).map(|i| Bytes::from(vec![i])).collect::<Vec<_>>());
        assert!(!queue.is_in_flight());
        assert_eq!(queue.len(), 0);

        let starts = AtomicUsize::new(0);
        queue
            .push(Bytes::from_static(b"x"), || {
                starts.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_partial_write_resumes() {
        let queue = OutgoingQueue::new();
        queue.push(Bytes::from_static(b"hello"), || {}).unwrap();

        assert_eq!(queue.next_chunk().unwrap(), Bytes::from_static(b"hello"));
        assert!(!queue.advance(2));
        assert_eq!(queue.next_chunk().unwrap(), Bytes::from_static(b"llo"));
        assert!(queue.advance(3));
        assert!(queue.next_chunk().is_none());
    }

    #[test]
    fn test_empty_buffer_completes() {
        let queue = OutgoingQueue::new();
        queue.push(Bytes::new(), || {}).unwrap();
        let chunk = queue.next_chunk().unwrap();
        assert!(chunk.is_empty());
        assert!(queue.advance(0));
    }

    #[test]
    fn test_drop_head() {
        let queue = OutgoingQueue::new();
        queue.push(Bytes::from_static(b"abc"), || {}).unwrap();
        queue.push(Bytes::from_static(b"de"), || {}).unwrap();

        assert_eq!(queue.drop_head(), Some(3));
        assert_eq!(queue.next_chunk().unwrap(), Bytes::from_static(b"de"));
    }

    #[test]
    fn test_closed_queue_rejects_and_discards() {
        let queue = OutgoingQueue::new();
        queue.push(Bytes::from_static(b"a"), || {}).unwrap();
        queue.push(Bytes::from_static(b"b"), || {}).unwrap();

        assert_eq!(queue.close(), 2);
        assert_eq!(queue.len(), 0);
        assert!(queue.next_chunk().is_none());
        assert_eq!(
            queue.push(Bytes::from_static(b"c"), || panic!("must not start")),
            Err(LinkError::Closed)
        );
    }

    #[test]
    fn test_single_flight_under_contention() {
        let queue = Arc::new(OutgoingQueue::new());
        let outstanding = Arc::new(AtomicUsize::new(0));
        let max_outstanding = Arc::new(AtomicUsize::new(0));
        let sent = Arc::new(AtomicUsize::new(0));
        let drainers = Arc::new(Mutex::new(Vec::new()));

        let mut producers = Vec::new();
        for t in 0..10u8 {
            let queue = queue.clone();
            let outstanding = outstanding.clone();
            let max_outstanding = max_outstanding.clone();
            let sent = sent.clone();
            let drainers = drainers.clone();
            producers.push(std::thread::spawn(move || {
                for i in 0..100u8 {
                    let q = queue.clone();
                    let outstanding = outstanding.clone();
                    let max_outstanding = max_outstanding.clone();
                    let sent = sent.clone();
                    let drainers_inner = drainers.clone();
                    queue
                        .push(Bytes::from(vec![t, i]), move || {
                            let handle = std::thread::spawn(move || {
                                while let Some(chunk) = q.next_chunk() {
                                    let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                                    max_outstanding.fetch_max(now, Ordering::SeqCst);
                                    outstanding.fetch_sub(1, Ordering::SeqCst);
                                    q.advance(chunk.len());
                                    sent.fetch_add(1, Ordering::SeqCst);
                                }
                            });
                            drainers_inner.lock().push(handle);
                        })
                        .unwrap();
                }
            }));
        }

        for producer in producers {
            producer.join().unwrap();
        }
        loop {
            let handle = drainers.lock().pop();
            match handle {
                Some(handle) => handle.join().unwrap(),
                None => break,
            }
        }

        assert_eq!(sent.load(Ordering::SeqCst), 1000);
        assert_eq!(max_outstanding.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 0);
    }
}
