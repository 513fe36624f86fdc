//! Interactive transport: one scan per line, for development without a scanner.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{deliver, sleep_or_cancel};

const PROMPT: &[u8] = b"Enter ISBN13 or shelf code: ";
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct LineReader<R> {
    input: R,
    tx: mpsc::Sender<String>,
    prompt: bool,
}

impl<R: AsyncBufRead + Unpin + Send> LineReader<R> {
    pub fn new(input: R, tx: mpsc::Sender<String>) -> Self {
        Self { input, tx, prompt: false }
    }

    /// Print a prompt on stdout before each line.
    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    /// Forward trimmed lines until EOF or cancellation. Bytes that are not
    /// UTF-8 are replaced, so a garbled line is discarded downstream instead
    /// of ending input.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut buf = Vec::new();
        loop {
            if self.prompt {
                let mut out = tokio::io::stdout();
                let _ = out.write_all(PROMPT).await;
                let _ = out.flush().await;
            }
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.input.read_until(b'\n', &mut buf) => r,
            };
            match read {
                Ok(0) => {
                    info!("end of input, no more scans");
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    if !deliver(&self.tx, line, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot read from stdin, retrying");
                    if !sleep_or_cancel(READ_RETRY_DELAY, &cancel).await {
                        break;
                    }
                }
            }
        }
    }
}
