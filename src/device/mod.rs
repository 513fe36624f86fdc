//! Device stream reader.
//!
//! Turns a keyboard-emulating barcode scanner into a stream of completed scan
//! codes. A producer task owns the transport and pushes every completed code
//! into a bounded queue; the consumer pulls them one at a time with
//! [`ScanReceiver::next_code`]. The queue blocks the producer when full and
//! never drops or overwrites a code.
//!
//! Two transports exist: a grabbed hardware input device (see [`evdev`]) and
//! line-based stdin for development without a scanner (see [`stdin`]).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DeviceError;

pub mod evdev;
pub mod stdin;

/// A key-down event as far as scan assembly is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Digit(u8),
    Enter,
    Other,
}

/// Collects digit keys until ENTER (or a read error) completes the code.
#[derive(Debug, Default)]
pub struct CodeAccumulator {
    buf: String,
}

impl CodeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one key. Returns the completed code on ENTER.
    pub fn push(&mut self, key: KeyInput) -> Option<String> {
        match key {
            KeyInput::Digit(d) if d <= 9 => {
                self.buf.push(char::from(b'0' + d));
                None
            }
            KeyInput::Enter => Some(self.flush()),
            KeyInput::Digit(_) | KeyInput::Other => None,
        }
    }

    /// Take whatever has been collected so far, possibly nothing.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    pub fn pending(&self) -> &str {
        &self.buf
    }
}

/// Source of raw key events. Implemented by the hardware transport and by
/// test doubles.
#[async_trait]
pub trait KeySource: Send {
    /// Acquire the device exclusively and switch it to non-blocking reads.
    async fn open(&mut self) -> Result<(), DeviceError>;

    /// Wait for the next key-down event.
    async fn next_key(&mut self) -> Result<KeyInput, DeviceError>;

    /// Release the device. Called after read errors and on shutdown.
    fn close(&mut self);

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Closed,
    Opening,
    Grabbed,
}

/// Producer side of the pipeline for a [`KeySource`].
///
/// Open failures, grab failures and read errors all send the reader back to
/// [`ReaderState::Opening`], retried after a fixed delay until cancelled. A
/// partial code in flight when the device fails is flushed as-is.
pub struct DeviceReader<S: KeySource> {
    source: S,
    state: ReaderState,
    acc: CodeAccumulator,
    retry_delay: Duration,
    tx: mpsc::Sender<String>,
}

impl<S: KeySource> DeviceReader<S> {
    pub fn new(source: S, tx: mpsc::Sender<String>, retry_delay: Duration) -> Self {
        Self {
            source,
            state: ReaderState::Closed,
            acc: CodeAccumulator::new(),
            retry_delay,
            tx,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let name = self.source.describe();
        loop {
            match self.state {
                ReaderState::Closed | ReaderState::Opening => {
                    if self.state == ReaderState::Opening && !sleep_or_cancel(self.retry_delay, &cancel).await {
                        break;
                    }
                    self.state = ReaderState::Opening;
                    let opened = tokio::select! {
                        _ = cancel.cancelled() => break,
                        r = self.source.open() => r,
                    };
                    match opened {
                        Ok(()) => {
                            info!(device = %name, "scanner device grabbed");
                            self.state = ReaderState::Grabbed;
                        }
                        Err(e) => {
                            warn!(device = %name, error = %e, "scanner device unavailable, retrying");
                            self.source.close();
                        }
                    }
                }
                ReaderState::Grabbed => {
                    let key = tokio::select! {
                        _ = cancel.cancelled() => break,
                        k = self.source.next_key() => k,
                    };
                    match key {
                        Ok(key) => {
                            if let Some(code) = self.acc.push(key) {
                                if !deliver(&self.tx, code, &cancel).await {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(device = %name, error = %e, pending = self.acc.pending(), "scanner read failed");
                            self.source.close();
                            self.state = ReaderState::Opening;
                            let partial = self.acc.flush();
                            if !deliver(&self.tx, partial, &cancel).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
        self.source.close();
        self.state = ReaderState::Closed;
        debug!(device = %name, "device reader stopped");
    }
}

/// Push a completed code, waiting for room. Returns false when the pipeline
/// is shutting down.
pub(crate) async fn deliver(tx: &mpsc::Sender<String>, code: String, cancel: &CancellationToken) -> bool {
    debug!(code = %code, "scan completed");
    tokio::select! {
        _ = cancel.cancelled() => false,
        r = tx.send(code) => r.is_ok(),
    }
}

pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Consumer side of the scan queue.
pub struct ScanReceiver {
    rx: mpsc::Receiver<String>,
}

impl ScanReceiver {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Wait for the next completed code. `None` once every producer is gone.
    pub async fn next_code(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Bounded single-producer/single-consumer scan queue.
pub fn scan_queue(capacity: usize) -> (mpsc::Sender<String>, ScanReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, ScanReceiver::new(rx))
}

/// Where scans come from, chosen by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTransport {
    HardwareDevice { path: PathBuf },
    InteractiveStdin,
}

impl DeviceTransport {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => DeviceTransport::HardwareDevice { path },
            None => DeviceTransport::InteractiveStdin,
        }
    }

    /// Start the producer task and hand back the consumer end of the queue.
    pub fn spawn(
        self,
        capacity: usize,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> (ScanReceiver, JoinHandle<()>) {
        let (tx, rx) = scan_queue(capacity);
        let handle = match self {
            DeviceTransport::HardwareDevice { path } => {
                info!(path = %path.display(), "reading scans from input device");
                let reader = DeviceReader::new(self::evdev::HardwareKeySource::new(path), tx, retry_delay);
                tokio::spawn(reader.run(cancel))
            }
            DeviceTransport::InteractiveStdin => {
                info!("no input device configured, reading scans from stdin");
                let reader = self::stdin::LineReader::new(tokio::io::BufReader::new(tokio::io::stdin()), tx)
                    .with_prompt(true);
                tokio::spawn(reader.run(cancel))
            }
        };
        (rx, handle)
    }
}
