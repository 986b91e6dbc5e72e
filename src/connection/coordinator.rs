//! The coordinator task owning the correlation and subscription tables.
//!
//! Every mutation of either table arrives here as a message and is applied in
//! intake order; the tables themselves need no locking.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use crate::error::Error;
use crate::protocol::Packet;

use super::correlation::{CorrelationKey, CorrelationTable, ReplySink};
use super::subscription::{CallbackSink, SubscriptionTable};

/// Mutations serialized through the coordinator.
pub(crate) enum Command {
    /// Install a correlation entry for a response-expected request.
    Correlate { key: CorrelationKey, sink: ReplySink },
    /// Route an inbound reply to its waiting caller.
    Deliver(Packet),
    /// Route an inbound callback to matching subscriptions.
    Dispatch(Packet),
    /// A correlation timer fired.
    Expire { key: CorrelationKey, token: u64 },
    /// Fail a correlation entry whose request never reached the socket.
    Fail { key: CorrelationKey, error: Error },
    /// Register a callback sink.
    Register {
        uid: u32,
        function: u8,
        sink: CallbackSink,
    },
    /// Remove a callback sink.
    Deregister {
        uid: u32,
        function: u8,
        sink: CallbackSink,
    },
}

pub(crate) struct Coordinator {
    correlations: CorrelationTable,
    subscriptions: SubscriptionTable,
    // Handed to correlation timers so expiries queue up behind other commands
    cmd_tx: mpsc::Sender<Command>,
}

impl Coordinator {
    pub(crate) fn new(response_timeout: Duration, cmd_tx: mpsc::Sender<Command>) -> Self {
        Self {
            correlations: CorrelationTable::new(response_timeout),
            subscriptions: SubscriptionTable::new(),
            cmd_tx,
        }
    }

    /// Apply commands until shutdown, then drain outstanding correlations.
    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
            }
        }

        let pending = self.correlations.len();
        self.correlations.drain();
        debug!(
            pending,
            subscriptions = self.subscriptions.len(),
            "coordinator stopped"
        );
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Correlate { key, sink } => {
                self.correlations.insert(key, sink, self.cmd_tx.clone());
            }
            Command::Deliver(packet) => {
                let (uid, function, sequence) =
                    (packet.uid(), packet.function(), packet.sequence());
                if !self.correlations.deliver(packet) {
                    trace!(uid, function, sequence, "dropping unmatched reply");
                }
            }
            Command::Dispatch(packet) => self.subscriptions.dispatch(&packet),
            Command::Expire { key, token } => self.correlations.expire(key, token),
            Command::Fail { key, error } => self.correlations.fail(key, error),
            Command::Register {
                uid,
                function,
                sink,
            } => self.subscriptions.register(uid, function, sink),
            Command::Deregister {
                uid,
                function,
                sink,
            } => self.subscriptions.deregister(uid, function, &sink),
        }
    }
}
