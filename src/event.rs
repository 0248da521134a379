//! Lifecycle and data events with per-kind subscriber lists.
//!
//! Dispatch is synchronous, on the caller's own thread, in registration
//! order. A panicking subscriber is caught at the dispatch boundary so it
//! cannot corrupt connection state or abort the triggering operation.

use crate::error::EquipmentError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Event payloads, one variant per event kind.
#[derive(Debug, Clone)]
pub enum Event {
    /// A connection was established.
    Connected,
    /// An active connection was closed.
    Disconnected,
    /// An operation failed; carries the recorded error snapshot.
    Error(EquipmentError),
    /// A read completed; carries the start address and the register values.
    DataReceived { address: u16, values: Vec<u16> },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected => EventKind::Connect,
            Event::Disconnected => EventKind::Disconnect,
            Event::Error(_) => EventKind::Error,
            Event::DataReceived { .. } => EventKind::DataReceived,
        }
    }
}

/// The four subscribable event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Error,
    DataReceived,
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

pub(crate) type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Ordered subscriber lists per event kind.
///
/// Registering the same closure twice yields two handles and two
/// invocations per event.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    entries: Vec<(EventKind, CallbackId, Callback)>,
    next_id: u64,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, kind: EventKind, callback: Callback) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.entries.push((kind, id, callback));
        id
    }

    /// Removes one registration; returns false if the handle is unknown
    /// for that kind.
    pub(crate) fn unregister(&mut self, kind: EventKind, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, i, _)| !(*k == kind && *i == id));
        self.entries.len() != before
    }

    /// Snapshot of the subscribers for one kind, in registration order.
    ///
    /// The snapshot lets the facade drop its state borrow before invoking
    /// anything, so subscribers may re-enter the driver.
    pub(crate) fn subscribers(&self, kind: EventKind) -> Vec<Callback> {
        self.entries
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect()
    }
}

/// Invokes each subscriber in order, isolating panics.
pub(crate) fn dispatch(subscribers: &[Callback], event: &Event) {
    for callback in subscribers {
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            log::error!("subscriber for {:?} panicked, event dropped for it", event.kind());
        }
    }
}
