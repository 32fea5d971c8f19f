//! Entry fetchers
//!
//! A fetcher turns a live source into a sequence of raw text "entries". Lines
//! are buffered until a data line arrives, so a `# HELP` / `# TYPE` header and
//! the sample that follows it travel together as one entry.
//!
//! Streaming fetchers run in a background task and hand entries over a
//! capacity-1 channel. Every send and every wait races the fetcher's
//! cancellation token, so [`EntryFetcher::close`] never leaves the producer
//! blocked on a receiver that stopped listening.

pub mod file;
pub mod tailer;
pub mod url;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::provider::source::SnapshotSource;

pub use file::FileBatchReader;
pub use tailer::FileTailer;

/// Accumulates lines until a complete entry is available
#[derive(Debug, Default)]
pub struct EntryBuffer {
    buf: String,
}

impl EntryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line; returns the finished entry when `line` is a data line
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        self.buf.push_str(line);
        self.buf.push('\n');
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Drop any partially accumulated header lines
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Split a full snapshot into entries
///
/// Trailing comment or blank lines without a following data line produce no entry.
pub fn split_entries(text: &str) -> Vec<String> {
    let mut buffer = EntryBuffer::new();
    text.lines().filter_map(|line| buffer.push_line(line)).collect()
}

/// Hand `entry` to the consumer unless cancellation wins the race
///
/// Returns `false` when the producer should stop: either the token fired or
/// the receiver is gone.
pub(crate) async fn send_entry(
    tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
    entry: String,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(entry) => sent.is_ok(),
    }
}

/// Handle to a streaming fetcher task
pub struct EntryFetcher {
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    description: String,
}

impl EntryFetcher {
    /// Follow `path` from its beginning, polling for new data every `poll`
    ///
    /// The fetcher stops when `parent` or its own token is cancelled.
    pub fn tail_file(path: PathBuf, poll: Duration, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let description = format!("file: {}", path.display());
        let tailer = FileTailer::new(path);
        let handle = tokio::spawn(file::stream_entries(tailer, poll, tx, cancel.clone()));

        Self {
            rx,
            cancel,
            handle: Some(handle),
            description,
        }
    }

    /// Fetch a snapshot from `source` on every `interval` tick and emit its entries
    pub fn poll_url<S>(source: S, interval: Duration, parent: &CancellationToken) -> Self
    where
        S: SnapshotSource + 'static,
    {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(1);
        let description = source.to_string();
        let handle = tokio::spawn(url::stream_entries(source, interval, tx, cancel.clone()));

        Self {
            rx,
            cancel,
            handle: Some(handle),
            description,
        }
    }

    /// Next entry in production order, or `None` once the fetcher stopped
    pub async fn next_entry(&mut self) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            entry = self.rx.recv() => entry,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Stop the producer and wait for it to exit
    ///
    /// Safe to call more than once. The channel is never closed from this side
    /// while the producer may still be sending; the token unblocks it instead.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle.await {
            tracing::warn!(source = %self.description, error = %e, "Entry fetcher task failed");
        }
        tracing::debug!(source = %self.description, "Entry fetcher closed");
    }
}

impl Drop for EntryFetcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_buffer_groups_header_with_sample() {
        let mut buffer = EntryBuffer::new();
        assert_eq!(buffer.push_line("# HELP foo help"), None);
        assert_eq!(buffer.push_line("# TYPE foo gauge"), None);
        assert_eq!(
            buffer.push_line("foo 1"),
            Some("# HELP foo help\n# TYPE foo gauge\nfoo 1\n".to_string())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_entry_buffer_blank_lines_stay_buffered() {
        let mut buffer = EntryBuffer::new();
        assert_eq!(buffer.push_line(""), None);
        assert_eq!(buffer.push_line("bar 2"), Some("\nbar 2\n".to_string()));
    }

    #[test]
    fn test_split_entries() {
        let text = "# TYPE a counter\na 1\nb 2\n# HELP c dangling\n";
        let entries = split_entries(text);
        assert_eq!(entries, vec!["# TYPE a counter\na 1\n", "b 2\n"]);
    }

    #[tokio::test]
    async fn test_send_entry_aborts_on_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        assert!(send_entry(&tx, &cancel, "a 1\n".to_string()).await);

        // Channel is full now; cancellation must unblock the second send
        let waiter = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { send_entry(&tx, &cancel, "b 2\n".to_string()).await })
        };
        cancel.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_send_entry_receiver_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        assert!(!send_entry(&tx, &cancel, "a 1\n".to_string()).await);
    }
}
