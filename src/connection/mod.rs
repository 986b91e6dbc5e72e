//! The connection engine.
//!
//! Owns the TCP socket and runs three workers: a writer draining the
//! submission queue, a reader draining the socket, and a coordinator owning
//! the correlation and subscription tables. Callers interact through the
//! [`Connection`] handle; the workers exchange messages and never share
//! mutable state.

mod coordinator;
mod correlation;
mod sequence;
mod subscription;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::protocol::{Packet, PacketCodec};

use self::coordinator::{Command, Coordinator};
use self::correlation::CorrelationKey;
use self::sequence::SequenceAllocator;

pub use self::subscription::WILDCARD_UID;

/// Completion signal back to the submitting caller.
enum Completion {
    /// Resolve as soon as the bytes are handed to the socket.
    Enqueued(oneshot::Sender<Result<()>>),
    /// Resolve with the correlated reply (or a terminal error).
    Reply(correlation::ReplySink),
}

/// One queued outbound request.
struct Submission {
    packet: Packet,
    completion: Completion,
}

impl Submission {
    fn fail(self, error: Error) {
        match self.completion {
            Completion::Enqueued(tx) => {
                let _ = tx.send(Err(error));
            }
            Completion::Reply(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

/// Handle to a brick daemon connection.
///
/// Cheap operations (`subscribe`, `unsubscribe`) only serialize with the
/// coordinator; `send` suspends until its terminal outcome. The handle is
/// shareable across tasks by reference.
pub struct Connection {
    submit_tx: mpsc::Sender<Submission>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl Connection {
    /// Connect to a brick daemon at `host:port` with default settings.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        Self::connect_with(ConnectionConfig::new(endpoint)).await
    }

    /// Connect with explicit configuration.
    pub async fn connect_with(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let stream = timeout(config.connect_timeout, TcpStream::connect(&config.endpoint))
            .await
            .map_err(|_| Error::ConnectFailed {
                addr: config.endpoint.clone(),
                reason: "connect timed out".into(),
            })?
            .map_err(|e| Error::ConnectFailed {
                addr: config.endpoint.clone(),
                reason: e.to_string(),
            })?;

        if config.tcp_nodelay {
            stream.set_nodelay(true).map_err(|e| Error::ConnectFailed {
                addr: config.endpoint.clone(),
                reason: e.to_string(),
            })?;
        }

        info!(endpoint = %config.endpoint, "connected to brick daemon");

        let (rd, wr) = stream.into_split();
        let (submit_tx, submit_rx) = mpsc::channel(config.submit_queue_depth);
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue_depth);
        let (shutdown_tx, _) = broadcast::channel(1);

        let (sequences, seq_handle) = SequenceAllocator::spawn(shutdown_tx.subscribe());

        let coordinator = Coordinator::new(config.response_timeout, cmd_tx.clone());
        let coordinator_handle = tokio::spawn(coordinator.run(cmd_rx, shutdown_tx.subscribe()));

        let writer_handle = tokio::spawn(run_writer(
            submit_rx,
            sequences,
            cmd_tx.clone(),
            FramedWrite::new(wr, PacketCodec::new()),
            shutdown_tx.clone(),
            shutdown_tx.subscribe(),
        ));

        let reader_handle = tokio::spawn(run_reader(
            rd,
            cmd_tx.clone(),
            shutdown_tx.clone(),
            shutdown_tx.subscribe(),
        ));

        Ok(Self {
            submit_tx,
            cmd_tx,
            shutdown_tx,
            workers: Mutex::new(Some(vec![
                seq_handle,
                coordinator_handle,
                writer_handle,
                reader_handle,
            ])),
        })
    }

    /// Send a packet.
    ///
    /// When the packet expects a response this suspends until the reply
    /// arrives and returns `Some(reply)`, or terminates with `Timeout`,
    /// `Closed` or `WriteFailed`. Otherwise it returns `None` once the bytes
    /// have been handed to the socket writer. Submissions from one caller are
    /// transmitted in submission order.
    pub async fn send(&self, packet: Packet) -> Result<Option<Packet>> {
        if packet.response_expected() {
            let (tx, rx) = oneshot::channel();
            self.submit(Submission {
                packet,
                completion: Completion::Reply(tx),
            })
            .await?;
            match rx.await {
                Ok(result) => result.map(Some),
                Err(_) => Err(Error::Closed),
            }
        } else {
            let (tx, rx) = oneshot::channel();
            self.submit(Submission {
                packet,
                completion: Completion::Enqueued(tx),
            })
            .await?;
            match rx.await {
                Ok(result) => result.map(|()| None),
                Err(_) => Err(Error::Closed),
            }
        }
    }

    async fn submit(&self, submission: Submission) -> Result<()> {
        self.submit_tx
            .send(submission)
            .await
            .map_err(|_| Error::Closed)
    }

    /// Register a callback sink for `(uid, function)`.
    ///
    /// A `uid` of [`WILDCARD_UID`] matches callbacks from any device.
    /// Registering the same sink twice under one key is a no-op; distinct
    /// sinks under one key each receive every matching callback. Callbacks
    /// are consumed on the receiving task, so a handler may call back into
    /// this connection.
    pub async fn subscribe(
        &self,
        uid: u32,
        function: u8,
        sink: mpsc::Sender<Packet>,
    ) -> Result<()> {
        self.cmd_tx
            .send(Command::Register {
                uid,
                function,
                sink,
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Remove a callback sink registered under `(uid, function)`.
    ///
    /// Missing registrations are silently accepted.
    pub async fn unsubscribe(
        &self,
        uid: u32,
        function: u8,
        sink: &mpsc::Sender<Packet>,
    ) -> Result<()> {
        self.cmd_tx
            .send(Command::Deregister {
                uid,
                function,
                sink: sink.clone(),
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Close the connection.
    ///
    /// Stops the workers, closes the socket and fails every outstanding
    /// response-expected request with `Closed`. Idempotent; returns once all
    /// workers have exited.
    pub async fn close(&self) -> Result<()> {
        let workers = self.workers.lock().take();
        let _ = self.shutdown_tx.send(());

        if let Some(handles) = workers {
            for handle in handles {
                let _ = handle.await;
            }
            debug!("connection closed");
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Writer worker: drains the submission queue in FIFO order.
async fn run_writer(
    mut submit_rx: mpsc::Receiver<Submission>,
    mut sequences: SequenceAllocator,
    cmd_tx: mpsc::Sender<Command>,
    mut sink: FramedWrite<OwnedWriteHalf, PacketCodec>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let submission = tokio::select! {
            _ = shutdown_rx.recv() => break,
            submission = submit_rx.recv() => match submission {
                Some(submission) => submission,
                None => break,
            },
        };

        let Some(seq) = sequences.next().await else {
            submission.fail(Error::Closed);
            break;
        };

        let packet = submission.packet.with_sequence(seq);
        let key = CorrelationKey::of(&packet);

        // Correlate before the bytes leave, so the reply cannot race the entry
        let enqueued = match submission.completion {
            Completion::Reply(reply) => {
                if cmd_tx.send(Command::Correlate { key, sink: reply }).await.is_err() {
                    break;
                }
                None
            }
            Completion::Enqueued(tx) => Some(tx),
        };

        trace!(
            uid = packet.uid(),
            function = packet.function(),
            sequence = seq,
            response_expected = packet.response_expected(),
            "writing packet"
        );

        match sink.send(packet).await {
            Ok(()) => {
                if let Some(tx) = enqueued {
                    let _ = tx.send(Ok(()));
                }
            }
            Err(e) => {
                let error = Error::WriteFailed(e.to_string());
                warn!(error = %error, "writer terminated");
                match enqueued {
                    Some(tx) => {
                        let _ = tx.send(Err(error));
                    }
                    None => {
                        let _ = cmd_tx.send(Command::Fail { key, error }).await;
                    }
                }
                let _ = shutdown_tx.send(());
                break;
            }
        }
    }

    // Anything still queued will never reach the socket
    submit_rx.close();
    while let Ok(submission) = submit_rx.try_recv() {
        submission.fail(Error::Closed);
    }

    let _ = sink.get_mut().shutdown().await;
    debug!("writer stopped");
}

/// Reader worker: drains the socket through the framer and classifies frames.
async fn run_reader(
    rd: OwnedReadHalf,
    cmd_tx: mpsc::Sender<Command>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut frames = FramedRead::new(rd, PacketCodec::new());

    loop {
        let item = tokio::select! {
            _ = shutdown_rx.recv() => break,
            item = frames.next() => item,
        };

        match item {
            Some(Ok(packet)) => {
                let command = if packet.is_callback() {
                    Command::Dispatch(packet)
                } else {
                    Command::Deliver(packet)
                };
                if cmd_tx.send(command).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                let error = Error::ReadFailed(e.to_string());
                warn!(error = %error, "reader terminated");
                break;
            }
            None => {
                debug!("connection closed by peer");
                break;
            }
        }
    }

    // Reader exit always drives the rest of the engine down
    let _ = shutdown_tx.send(());
    debug!("reader stopped");
}
