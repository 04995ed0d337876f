//! Per-port sentence writer.
//!
//! Device writes can block: hardware flow control, a full pty buffer, or
//! a slow USB adapter. A [`PortWriter`] owns the port on its own task and
//! takes sentences through a bounded queue, so the session lock is never
//! held across device I/O. When the queue is full the newest sentence is
//! dropped and the tick goes on.
//!
//! Each queued sentence carries the generation of the run that produced
//! it. The writer compares it with the session's live generation right
//! before handing the bytes to the device, so sentences still queued when
//! the engine stops are discarded. A write already in progress at that
//! moment cannot be recalled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::serial::{SerialError, SerialPort};

/// Sentences buffered per port before new ones are dropped.
pub const OUTPUT_QUEUE_DEPTH: usize = 8;

/// How long closing waits for an in-flight write before detaching.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

enum Command {
    Line { generation: u64, line: String },
    Flush(oneshot::Sender<()>),
}

/// Why a sentence was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueError {
    /// The device is behind by [`OUTPUT_QUEUE_DEPTH`] sentences.
    Full,
    /// The writer task has exited.
    Closed,
}

/// Handle that waits for the writer to drain its queue.
#[derive(Clone)]
pub(crate) struct FlushHandle(mpsc::Sender<Command>);

impl FlushHandle {
    /// Resolve once every sentence queued before this call has been
    /// written or discarded.
    pub(crate) async fn flush(self) {
        let (ack, done) = oneshot::channel();
        if self.0.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

pub(crate) struct PortWriter {
    path: String,
    port: SharedPort,
    tx: mpsc::Sender<Command>,
    task: JoinHandle<Result<(), SerialError>>,
}

impl PortWriter {
    /// Take ownership of `port` and start its writer task.
    pub(crate) fn spawn(port: Box<dyn SerialPort>, live_generation: Arc<AtomicU64>) -> Self {
        let path = port.path().to_owned();
        let port: SharedPort = Arc::new(Mutex::new(port));
        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        let task = tokio::spawn(run(
            Arc::clone(&port),
            rx,
            live_generation,
            path.clone(),
        ));
        Self {
            path,
            port,
            tx,
            task,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Whether the port accepts writes. A port busy in a write counts as
    /// open.
    pub(crate) fn is_open(&self) -> bool {
        match self.port.try_lock() {
            Ok(port) => port.is_open(),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        }
    }

    /// Queue one terminated sentence without waiting.
    pub(crate) fn queue(&self, generation: u64, line: String) -> Result<(), QueueError> {
        self.tx
            .try_send(Command::Line { generation, line })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })
    }

    pub(crate) fn flush_handle(&self) -> FlushHandle {
        FlushHandle(self.tx.clone())
    }

    /// Stop accepting sentences, let the writer drain, and close the port.
    ///
    /// Waits at most [`CLOSE_TIMEOUT`] for a stalled device; after that
    /// the writer closes the port on its own once the write returns.
    pub(crate) async fn shutdown(self) -> Result<(), SerialError> {
        let Self { path, tx, task, .. } = self;
        drop(tx);
        match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(join_error(&e)),
            Err(_elapsed) => {
                warn!(path, "Serial device still busy, closing in the background");
                Ok(())
            }
        }
    }
}

async fn run(
    port: SharedPort,
    mut rx: mpsc::Receiver<Command>,
    live_generation: Arc<AtomicU64>,
    path: String,
) -> Result<(), SerialError> {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Line { generation, line } => {
                if live_generation.load(Ordering::Acquire) != generation {
                    debug!(path, generation, "Discarding sentence from a stopped run");
                    continue;
                }
                let port = Arc::clone(&port);
                let written =
                    tokio::task::spawn_blocking(move || with_port(&port, |p| p.write(line.as_bytes())))
                        .await;
                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(path, error = %e, "Serial write failed"),
                    Err(e) => warn!(path, error = %e, "Serial write task failed"),
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    tokio::task::spawn_blocking(move || with_port(&port, |p| p.close()))
        .await
        .map_err(|e| join_error(&e))?
}

fn with_port<T>(
    port: &SharedPort,
    f: impl FnOnce(&mut Box<dyn SerialPort>) -> Result<T, SerialError>,
) -> Result<T, SerialError> {
    let mut guard = port.lock().map_err(|e| SerialError::Write {
        source: std::io::Error::other(e.to_string()),
    })?;
    f(&mut guard)
}

fn join_error(e: &tokio::task::JoinError) -> SerialError {
    SerialError::Write {
        source: std::io::Error::other(e.to_string()),
    }
}
