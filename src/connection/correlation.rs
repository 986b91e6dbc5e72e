//! Correlation of inbound replies to waiting callers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::Packet;

use super::coordinator::Command;

/// One-shot delivery channel back to a waiting caller.
pub(crate) type ReplySink = oneshot::Sender<Result<Packet>>;

/// Key identifying one in-flight response-expected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CorrelationKey {
    pub uid: u32,
    pub function: u8,
    pub sequence: u8,
}

impl CorrelationKey {
    pub(crate) fn of(packet: &Packet) -> Self {
        Self {
            uid: packet.uid(),
            function: packet.function(),
            sequence: packet.sequence(),
        }
    }
}

struct PendingReply {
    sink: ReplySink,
    timer: JoinHandle<()>,
    // Guards against a stale timer firing for a reused key
    token: u64,
}

/// Table of in-flight requests, owned exclusively by the coordinator.
pub(crate) struct CorrelationTable {
    entries: HashMap<CorrelationKey, PendingReply>,
    timeout: Duration,
    next_token: u64,
}

impl CorrelationTable {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            next_token: 0,
        }
    }

    /// Install an entry and arm its timeout timer.
    ///
    /// An unresolved entry under the same key is evicted and failed with
    /// `SequenceCollision`, keeping at most one live entry per key.
    pub(crate) fn insert(
        &mut self,
        key: CorrelationKey,
        sink: ReplySink,
        expire_tx: mpsc::Sender<Command>,
    ) {
        let token = self.next_token;
        self.next_token += 1;

        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = expire_tx.send(Command::Expire { key, token }).await;
        });

        if let Some(prior) = self.entries.insert(key, PendingReply { sink, timer, token }) {
            prior.timer.abort();
            let _ = prior.sink.send(Err(Error::SequenceCollision {
                uid: key.uid,
                function: key.function,
                sequence: key.sequence,
            }));
        }
    }

    /// Deliver an inbound reply to its waiting caller.
    ///
    /// Returns false when no entry matches; a late reply after timeout is
    /// dropped without effect.
    pub(crate) fn deliver(&mut self, packet: Packet) -> bool {
        match self.entries.remove(&CorrelationKey::of(&packet)) {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.sink.send(Ok(packet));
                true
            }
            None => false,
        }
    }

    /// Handle a fired timer. A timer whose entry was already resolved (and
    /// whose key was possibly reused) is a no-op thanks to the token.
    pub(crate) fn expire(&mut self, key: CorrelationKey, token: u64) {
        if self.entries.get(&key).is_some_and(|e| e.token == token) {
            if let Some(entry) = self.entries.remove(&key) {
                let _ = entry.sink.send(Err(Error::Timeout(self.timeout)));
            }
        }
    }

    /// Fail an entry whose request never reached the socket.
    pub(crate) fn fail(&mut self, key: CorrelationKey, error: Error) {
        if let Some(entry) = self.entries.remove(&key) {
            entry.timer.abort();
            let _ = entry.sink.send(Err(error));
        }
    }

    /// Fail every outstanding entry with `Closed`.
    pub(crate) fn drain(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
            let _ = entry.sink.send(Err(Error::Closed));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(uid: u32, function: u8, sequence: u8) -> CorrelationKey {
        CorrelationKey {
            uid,
            function,
            sequence,
        }
    }

    fn reply(uid: u32, function: u8, sequence: u8) -> Packet {
        let encoded = Packet::new(uid, function, true, Vec::new())
            .unwrap()
            .encode(sequence)
            .unwrap();
        Packet::from_frame(&encoded).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_deliver() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let mut table = CorrelationTable::new(Duration::from_secs(1));

        let (tx, rx) = oneshot::channel();
        table.insert(key(100, 5, 1), tx, cmd_tx);
        assert_eq!(table.len(), 1);

        assert!(table.deliver(reply(100, 5, 1)));
        assert_eq!(table.len(), 0);

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.uid(), 100);
    }

    #[tokio::test]
    async fn test_unmatched_reply_is_dropped() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let mut table = CorrelationTable::new(Duration::from_secs(1));

        let (tx, mut rx) = oneshot::channel();
        table.insert(key(100, 5, 1), tx, cmd_tx);

        // Same uid and function, different sequence
        assert!(!table.deliver(reply(100, 5, 2)));
        assert_eq!(table.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_collision_evicts_prior_entry() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let mut table = CorrelationTable::new(Duration::from_secs(1));

        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.insert(key(7, 3, 4), tx1, cmd_tx.clone());
        table.insert(key(7, 3, 4), tx2, cmd_tx);
        assert_eq!(table.len(), 1);

        assert!(matches!(
            rx1.await.unwrap(),
            Err(Error::SequenceCollision {
                uid: 7,
                function: 3,
                sequence: 4
            })
        ));

        // The newer entry still resolves normally
        assert!(table.deliver(reply(7, 3, 4)));
        assert!(rx2.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_timeout_expires_entry() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let mut table = CorrelationTable::new(Duration::from_millis(10));

        let (tx, rx) = oneshot::channel();
        table.insert(key(1, 1, 1), tx, cmd_tx);

        // The timer posts its expiry through the command queue
        let Some(Command::Expire { key: k, token }) = cmd_rx.recv().await else {
            panic!("expected expire command");
        };
        table.expire(k, token);

        assert_eq!(table.len(), 0);
        assert!(matches!(rx.await.unwrap(), Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_stale_timer_is_noop() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let mut table = CorrelationTable::new(Duration::from_secs(1));

        let (tx, rx) = oneshot::channel();
        table.insert(key(1, 1, 1), tx, cmd_tx.clone());
        assert!(table.deliver(reply(1, 1, 1)));

        // Key reused by a newer request; the old token must not evict it
        let (tx2, mut rx2) = oneshot::channel();
        table.insert(key(1, 1, 1), tx2, cmd_tx);
        table.expire(key(1, 1, 1), 0);
        assert_eq!(table.len(), 1);

        assert!(rx.await.unwrap().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drain_fails_everything_with_closed() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let mut table = CorrelationTable::new(Duration::from_secs(1));

        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.insert(key(1, 1, 1), tx1, cmd_tx.clone());
        table.insert(key(2, 2, 2), tx2, cmd_tx);

        table.drain();
        assert_eq!(table.len(), 0);
        assert!(matches!(rx1.await.unwrap(), Err(Error::Closed)));
        assert!(matches!(rx2.await.unwrap(), Err(Error::Closed)));
    }
}
