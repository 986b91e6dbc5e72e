//! Long-lived callback subscriptions.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::protocol::Packet;

/// Uid key that matches callbacks from any device.
pub const WILDCARD_UID: u32 = 0;

/// Bounded channel into which matching callbacks are delivered.
pub(crate) type CallbackSink = mpsc::Sender<Packet>;

struct SubscriptionEntry {
    uid: u32,
    function: u8,
    sink: CallbackSink,
}

/// Registered callback sinks, owned exclusively by the coordinator.
///
/// Entries live until explicit deregistration or engine shutdown; nothing is
/// removed on a per-packet basis.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: Vec<SubscriptionEntry>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a sink. Re-registering the same sink under the same key is a
    /// no-op; distinct sinks under the same key coexist.
    pub(crate) fn register(&mut self, uid: u32, function: u8, sink: CallbackSink) {
        let exists = self
            .entries
            .iter()
            .any(|e| e.uid == uid && e.function == function && e.sink.same_channel(&sink));
        if !exists {
            self.entries.push(SubscriptionEntry {
                uid,
                function,
                sink,
            });
        }
    }

    /// Remove the exact triple. Missing triples are silently accepted.
    pub(crate) fn deregister(&mut self, uid: u32, function: u8, sink: &CallbackSink) {
        self.entries
            .retain(|e| !(e.uid == uid && e.function == function && e.sink.same_channel(sink)));
    }

    /// Deliver a callback to every sink whose function matches and whose uid
    /// is the packet's uid or the wildcard.
    ///
    /// Delivery must never suspend the coordinator: a full sink drops this
    /// packet, a closed sink stays registered but receives nothing.
    pub(crate) fn dispatch(&self, packet: &Packet) {
        for entry in &self.entries {
            if entry.function != packet.function() {
                continue;
            }
            if entry.uid != WILDCARD_UID && entry.uid != packet.uid() {
                continue;
            }

            match entry.sink.try_send(packet.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        uid = packet.uid(),
                        function = packet.function(),
                        "callback sink full, dropping packet"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(
                        uid = entry.uid,
                        function = entry.function,
                        "callback sink closed"
                    );
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
