//! File-backed entry fetching
//!
//! Two modes share the same [`FileTailer`] and entry buffering:
//! - [`stream_entries`]: background task pushing entries to a consumer
//! - [`FileBatchReader`]: pull-based drain bounded by entry count and a time budget

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::tailer::FileTailer;
use super::{send_entry, EntryBuffer};
use crate::error::Result;
use crate::models::{merge_by_name, sort_by_name, Series};
use crate::parser::Parser;

/// Producer loop of a streaming file fetcher
pub(crate) async fn stream_entries(
    mut tailer: FileTailer,
    poll: Duration,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    tracing::info!(path = %tailer.path().display(), "Starting file entry fetcher");
    let mut buffer = EntryBuffer::new();

    'outer: loop {
        let lines = tokio::select! {
            _ = cancel.cancelled() => break,
            lines = tailer.read_new_lines() => lines,
        };

        match lines {
            Ok(lines) if !lines.is_empty() => {
                for line in lines {
                    if let Some(entry) = buffer.push_line(&line) {
                        if !send_entry(&tx, &cancel, entry).await {
                            break 'outer;
                        }
                    }
                }
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    path = %tailer.path().display(),
                    error = %e,
                    "Failed to read metrics file"
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }

    tracing::info!(path = %tailer.path().display(), "File entry fetcher stopped");
}

/// Limits applied to one [`FileBatchReader::get`] call
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Maximum entries parsed per call
    pub max_entries: usize,
    /// Cap of the incremental backoff while no data is available
    pub max_backoff: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_backoff: Duration::from_millis(10),
        }
    }
}

/// Pull-based drain of a tailed file
///
/// Each call parses whatever complete entries are available within the budget.
/// Parsed series are staged until a call returns them, so a read failure in
/// the middle of a drain does not lose the entries parsed before it.
pub struct FileBatchReader {
    tailer: FileTailer,
    parser: Parser,
    limits: BatchLimits,
    buffer: EntryBuffer,
    pending: VecDeque<String>,
    staged: Vec<Series>,
}

impl FileBatchReader {
    pub fn new(path: PathBuf, parser: Parser, limits: BatchLimits) -> Self {
        Self {
            tailer: FileTailer::new(path),
            parser,
            limits,
            buffer: EntryBuffer::new(),
            pending: VecDeque::new(),
            staged: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.tailer.path()
    }

    /// Lines read from the file but not yet buffered into an entry
    pub fn pending_lines(&self) -> usize {
        self.pending.len()
    }

    /// Drain available entries for at most `budget`
    ///
    /// Returns early once `max_entries` entries were parsed. While the file has
    /// no new data the reader sleeps with a doubling backoff capped at
    /// `max_backoff`, never past the deadline.
    ///
    /// # Errors
    /// Returns an I/O error when the file cannot be read. Series parsed before
    /// the failure stay staged for the next call.
    pub async fn get(&mut self, budget: Duration) -> Result<Vec<Series>> {
        let deadline = Instant::now() + budget;
        let mut entries = 0usize;
        let mut backoff = Duration::from_millis(1);

        while entries < self.limits.max_entries {
            if self.pending.is_empty() {
                let lines = self.tailer.read_new_lines().await?;
                self.pending.extend(lines);
            }

            let Some(line) = self.pending.pop_front() else {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                tokio::time::sleep(backoff.min(deadline - now)).await;
                backoff = (backoff * 2).min(self.limits.max_backoff);
                continue;
            };
            backoff = Duration::from_millis(1);

            if let Some(entry) = self.buffer.push_line(&line) {
                entries += 1;
                match self.parser.parse(entry.as_bytes()) {
                    Ok(batch) => merge_by_name(&mut self.staged, batch),
                    Err(e) => {
                        tracing::warn!(
                            path = %self.tailer.path().display(),
                            error = %e,
                            "Skipping unparsable metrics entry"
                        );
                    }
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        let mut batch = std::mem::take(&mut self.staged);
        for series in &mut batch {
            series.sort_samples();
        }
        sort_by_name(&mut batch);
        Ok(batch)
    }
}
