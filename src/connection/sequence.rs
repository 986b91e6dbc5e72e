//! Sequence number allocation for outbound requests.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::protocol::{FIRST_SEQUENCE, MAX_SEQUENCE};

/// Rotating source of 4-bit sequence numbers.
///
/// Numbers cycle 1, 2, …, 15, 1, …; 0 is reserved for inbound callbacks. The
/// generator task keeps a few numbers buffered ahead of demand and stops on
/// shutdown, so `next` never blocks indefinitely against a closing engine.
pub(crate) struct SequenceAllocator {
    rx: mpsc::Receiver<u8>,
}

impl SequenceAllocator {
    /// Spawn the generator task.
    pub(crate) fn spawn(mut shutdown: broadcast::Receiver<()>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(async move {
            let mut sequence = FIRST_SEQUENCE;
            loop {
                tokio::select! {
                    res = tx.send(sequence) => {
                        if res.is_err() {
                            break;
                        }
                    }
                    _ = shutdown.recv() => break,
                }
                sequence = if sequence == MAX_SEQUENCE {
                    FIRST_SEQUENCE
                } else {
                    sequence + 1
                };
            }
        });

        (Self { rx }, handle)
    }

    /// Obtain the next sequence number; `None` once the engine is shutting
    /// down.
    pub(crate) async fn next(&mut self) -> Option<u8> {
        self.rx.recv().await
    }
}
