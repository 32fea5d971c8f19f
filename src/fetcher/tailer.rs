//! File tailer for reading new lines from a growing metrics log.
//!
//! Supports rotation detection via inode tracking (Unix) and file size
//! comparison. Only complete, newline-terminated lines are consumed; a partially
//! written last line is left in place until its newline arrives. A line longer
//! than the per-read byte cap is skipped with a warning.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

/// Maximum number of lines returned by a single `read_new_lines()` call.
pub const MAX_LINES_PER_READ: usize = 10_000;

/// Upper bound on bytes pulled from the file per call.
const MAX_BYTES_PER_READ: u64 = 4 * 1024 * 1024;

/// Reads lines appended to a file since the last read position.
///
/// Starts at the beginning of the file. A missing file reads as empty until it
/// appears; rotation or truncation restarts from the beginning of the new file.
pub struct FileTailer {
    path: PathBuf,
    offset: u64,
    inode: Option<u64>,
    max_lines: usize,
    /// Inside an over-long line; drop bytes through its newline
    discarding: bool,
}

impl FileTailer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            inode: None,
            max_lines: MAX_LINES_PER_READ,
            discarding: false,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next unread line
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the last call.
    ///
    /// Returns at most `max_lines` lines per call, without their line endings.
    pub async fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let metadata = match fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Not created yet or rotation in progress; try next time
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let current_inode = get_inode(&metadata);
        let current_size = metadata.len();

        let rotated = self.inode.is_some_and(|inode| inode != current_inode);
        if rotated || current_size < self.offset {
            tracing::info!(
                path = %self.path.display(),
                previous_offset = self.offset,
                size = current_size,
                "File rotated or truncated, reading from the beginning"
            );
            self.offset = 0;
            self.discarding = false;
        }
        self.inode = Some(current_inode);

        if current_size <= self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let limit = (current_size - self.offset).min(MAX_BYTES_PER_READ);
        let mut buf = Vec::with_capacity(limit as usize);
        file.take(limit).read_to_end(&mut buf).await?;

        let mut lines = Vec::new();
        let mut consumed = 0usize;
        if self.discarding {
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    consumed = pos + 1;
                    self.discarding = false;
                }
                None => consumed = buf.len(),
            }
        }
        while !self.discarding && lines.len() < self.max_lines {
            let Some(pos) = buf[consumed..].iter().position(|&b| b == b'\n') else {
                break;
            };
            let mut line = &buf[consumed..consumed + pos];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            consumed += pos + 1;
        }

        // A full read with no newline can never complete a line
        if consumed == 0 && buf.len() as u64 == MAX_BYTES_PER_READ {
            tracing::warn!(
                path = %self.path.display(),
                offset = self.offset,
                max_bytes = MAX_BYTES_PER_READ,
                "Line exceeds read limit, skipping it"
            );
            consumed = buf.len();
            self.discarding = true;
        }

        self.offset += consumed as u64;
        Ok(lines)
    }
}

/// Extract inode from file metadata.
#[cfg(unix)]
fn get_inode(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

/// Non-Unix fallback: rotation is detected by size alone.
#[cfg(not(unix))]
fn get_inode(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_tailer_reads_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        std::fs::write(&path, "foo 1\nbar 2\n").unwrap();

        let mut tailer = FileTailer::new(path);
        let lines = tailer.read_new_lines().await.unwrap();
        assert_eq!(lines, vec!["foo 1", "bar 2"]);

        let lines = tailer.read_new_lines().await.unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_tailer_reads_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        std::fs::write(&path, "old 1\n").unwrap();

        let mut tailer = FileTailer::new(path.clone());
        tailer.read_new_lines().await.unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "new 1").unwrap();
        writeln!(f, "new 2").unwrap();
        drop(f);

        let lines = tailer.read_new_lines().await.unwrap();
        assert_eq!(lines, vec!["new 1", "new 2"]);
    }

    #[tokio::test]
    async fn test_tailer_waits_for_complete_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        std::fs::write(&path, "foo 1\nfoo 2").unwrap();

        let mut tailer = FileTailer::new(path.clone());
        assert_eq!(tailer.read_new_lines().await.unwrap(), vec!["foo 1"]);
        assert_eq!(tailer.offset(), 6);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "000").unwrap();
        drop(f);

        assert_eq!(tailer.read_new_lines().await.unwrap(), vec!["foo 2000"]);
    }

    #[tokio::test]
    async fn test_tailer_skips_line_longer_than_read_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        let long = "x".repeat(5 * 1024 * 1024);
        std::fs::write(&path, format!("first 1\n{}\nafter 2\n", long)).unwrap();
        let size = std::fs::metadata(&path).unwrap().len();

        let mut tailer = FileTailer::new(path);
        let mut lines = Vec::new();
        for _ in 0..4 {
            lines.extend(tailer.read_new_lines().await.unwrap());
        }
        assert_eq!(lines, vec!["first 1", "after 2"]);
        assert_eq!(tailer.offset(), size);
    }

    #[tokio::test]
    async fn test_tailer_detects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        std::fs::write(&path, format!("{}\n", "a".repeat(1000))).unwrap();

        let mut tailer = FileTailer::new(path.clone());
        tailer.read_new_lines().await.unwrap();

        std::fs::write(&path, "after rotation\n").unwrap();
        let lines = tailer.read_new_lines().await.unwrap();
        assert_eq!(lines, vec!["after rotation"]);
    }

    #[tokio::test]
    async fn test_tailer_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");

        let mut tailer = FileTailer::new(path.clone());
        assert!(tailer.read_new_lines().await.unwrap().is_empty());

        std::fs::write(&path, "late 1\n").unwrap();
        assert_eq!(tailer.read_new_lines().await.unwrap(), vec!["late 1"]);
    }

    #[tokio::test]
    async fn test_tailer_respects_max_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        std::fs::write(&path, "a 1\nb 2\nc 3\r\n").unwrap();

        let mut tailer = FileTailer::new(path).with_max_lines(2);
        assert_eq!(tailer.read_new_lines().await.unwrap(), vec!["a 1", "b 2"]);
        assert_eq!(tailer.read_new_lines().await.unwrap(), vec!["c 3"]);
    }
}
