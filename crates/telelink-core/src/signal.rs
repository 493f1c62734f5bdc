//! Notifications from a link to its owner.
//!
//! Every [`LinkBase`](crate::LinkBase) carries three signals: one per
//! received frame, one when the link dies and one for errors that happen
//! away from the caller (a dropped send, a dead socket). Owners attach
//! closures with [`Signal::connect`] and detach them with the returned
//! [`ConnectionId`], or hold a [`ConnectionGuard`] that detaches on drop.
//!
//! Slots run on whichever thread emits. For a UDP link that is its I/O
//! thread, and the next datagram is not read until every slot returns.
//! Slots are copied out before they are called, so one may disconnect
//! itself or close the link that is emitting.
//!
//! # Example
//!
//! ```
//! use telelink_core::{LinkError, Signal};
//!
//! let error = Signal::<LinkError>::new();
//!
//! let conn_id = error.connect(|err| {
//!     eprintln!("link error: {err}");
//! });
//!
//! error.emit(LinkError::NoPeer(17));
//! error.disconnect(conn_id);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// Handle for one attached slot, see [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A list of slots called with `&Args` on every emission.
///
/// `Args` is `()` for bare notifications such as `closed`.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
    blocked: AtomicBool,
}

impl<Args: Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Send + 'static> Signal<Args> {
    /// A signal with nothing attached.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Attach a slot. Keep the id to detach it again.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Detach a slot. `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Detach every slot.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Number of attached slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Mute the signal. Emissions while muted are lost, not deferred.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether the signal is muted.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Call every attached slot with `args`, oldest first.
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let slots: Vec<Slot<Args>> = self.connections.lock().values().cloned().collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        for slot in slots {
            slot(&args);
        }
    }

    /// Attach a slot for as long as the returned guard lives.
    ///
    /// The guard only holds a weak reference; dropping it after the signal
    /// is gone does nothing.
    pub fn connect_scoped<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard {
            signal: Arc::downgrade(self),
            id,
        }
    }
}

/// Detaches its slot when dropped. Returned by [`Signal::connect_scoped`].
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use telelink_core::Signal;
///
/// let closed = Arc::new(Signal::<()>::new());
/// let seen = Arc::new(AtomicUsize::new(0));
/// {
///     let seen = seen.clone();
///     let _watch = closed.connect_scoped(move |_| {
///         seen.fetch_add(1, Ordering::SeqCst);
///     });
///     closed.emit(());
/// }
/// closed.emit(());
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct ConnectionGuard<Args: Send + 'static> {
    signal: Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: Send + 'static> ConnectionGuard<Args> {
    /// Id of the guarded slot.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}
