//! Output forwarding for spawned processes
//!
//! Every line a child writes to stdout or stderr is logged on the
//! `rigger::output` target and, while someone is listening, pushed into a
//! combined [`OutputLines`] stream that readiness monitors consume.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A single line of process output, without its trailing newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

pub type OutputSender = mpsc::UnboundedSender<OutputLine>;

/// Combined stdout/stderr of one process, in arrival order
pub struct OutputLines {
    rx: mpsc::UnboundedReceiver<OutputLine>,
}

impl OutputLines {
    pub fn channel() -> (OutputSender, OutputLines) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, OutputLines { rx })
    }

    /// Next line, or None once every writer has closed
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.rx.recv().await
    }
}

/// Spawn a task that logs each line of `reader` and forwards it to `tx`
///
/// Lines are decoded lossily so a tool printing invalid UTF-8 cannot stall
/// its own readiness detection. The task ends when the pipe closes.
pub fn forward<R>(
    process: Arc<str>,
    stream: OutputStream,
    reader: R,
    tx: Option<OutputSender>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    info!(target: "rigger::output", process = %process, stream = %stream, "{}", text);
                    if let Some(tx) = &tx {
                        // The receiver goes away once readiness is settled
                        let _ = tx.send(OutputLine { stream, text });
                    }
                }
                Err(e) => {
                    warn!("Reading {} of {} failed: {}", stream, process, e);
                    break;
                }
            }
        }
    })
}
