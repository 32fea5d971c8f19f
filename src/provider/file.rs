//! Providers over a metrics file

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::Provider;
use crate::cache::AggregationCache;
use crate::error::Result;
use crate::fetcher::FileBatchReader;
use crate::models::Series;
use crate::parser::Parser;

enum Mode {
    /// Whole-file re-read; `view` is a pristine cache cloned per call
    Snapshot {
        path: PathBuf,
        parser: Parser,
        view: AggregationCache,
    },
    /// Incremental drain into a persistent cache
    Tail {
        reader: FileBatchReader,
        cache: AggregationCache,
        budget: Duration,
    },
}

/// Provider reading a local metrics file
pub struct FileProvider {
    path: PathBuf,
    mode: Mode,
}

impl FileProvider {
    /// Re-read and re-parse the whole file on every call
    ///
    /// No history is kept between calls. The window, label policy and filter of
    /// `view` are applied to each fresh parse.
    pub fn snapshot(path: PathBuf, parser: Parser, view: AggregationCache) -> Self {
        Self {
            path: path.clone(),
            mode: Mode::Snapshot { path, parser, view },
        }
    }

    /// Drain newly appended entries within `budget` and merge them into `cache`
    pub fn tail(reader: FileBatchReader, cache: AggregationCache, budget: Duration) -> Self {
        Self {
            path: reader.path().to_path_buf(),
            mode: Mode::Tail {
                reader,
                cache,
                budget,
            },
        }
    }
}

#[async_trait]
impl Provider for FileProvider {
    async fn get(&mut self) -> Result<Vec<Series>> {
        match &mut self.mode {
            Mode::Snapshot { path, parser, view } => {
                let raw = tokio::fs::read(&*path).await?;
                let batch = parser.parse(&raw)?;
                Ok(view.clone().add(batch))
            }
            Mode::Tail {
                reader,
                cache,
                budget,
            } => {
                let batch = reader.get(*budget).await?;
                tracing::debug!(path = %self.path.display(), series = batch.len(), "Drained metrics file");
                Ok(cache.add(batch))
            }
        }
    }

    fn describe(&self) -> String {
        format!("file: {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LabelPolicy;
    use crate::clock::ManualClock;
    use crate::fetcher::file::BatchLimits;
    use chrono::TimeZone;
    use std::io::Write;
    use std::sync::Arc;

    fn clock_at(secs: i64) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(chrono::Utc.timestamp_opt(secs, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_snapshot_applies_window_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.txt");
        std::fs::write(&path, "foo 1 1000\nfoo 2 8000\n").unwrap();

        let clock = clock_at(10);
        let view = AggregationCache::new(chrono::Duration::seconds(5), clock.clone());
        let mut provider = FileProvider::snapshot(path, Parser::new(clock.clone()), view);

        let batch = provider.get().await.unwrap();
        assert_eq!(batch.len(), 1);
        let values: Vec<f64> = batch[0].samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0]);

        // No history accumulates between calls
        let batch = provider.get().await.unwrap();
        assert_eq!(batch[0].samples.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock_at(0);
        let view = AggregationCache::new(chrono::Duration::seconds(5), clock.clone());
        let mut provider =
            FileProvider::snapshot(dir.path().join("nope.txt"), Parser::new(clock), view);
        assert_eq!(provider.get().await.unwrap_err().kind(), "io_error");
    }

    #[tokio::test]
    async fn test_tail_keeps_history_for_growing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.log");
        std::fs::write(&path, "# TYPE rps gauge\nrps{node=\"a\",status=\"ok\"} 1 1000\n").unwrap();

        let clock = clock_at(3);
        let reader = FileBatchReader::new(path.clone(), Parser::new(clock.clone()), BatchLimits::default());
        let cache = AggregationCache::new(chrono::Duration::seconds(60), clock.clone())
            .with_label_policy(LabelPolicy::parse("status", ",").unwrap());
        let mut provider = FileProvider::tail(reader, cache, Duration::from_millis(20));
        assert_eq!(provider.describe(), format!("file: {}", path.display()));

        let batch = provider.get().await.unwrap();
        assert_eq!(batch[0].name, r#"rps{node="a"}"#);
        assert_eq!(batch[0].samples.len(), 1);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "# TYPE rps gauge").unwrap();
        writeln!(f, "rps{{node=\"a\",status=\"ok\"}} 2 2000").unwrap();
        drop(f);

        let batch = provider.get().await.unwrap();
        assert_eq!(batch.len(), 1);
        let values: Vec<f64> = batch[0].samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }
}
