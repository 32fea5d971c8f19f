//! Providers: the pull interface consumed by the display loop
//!
//! A provider composes a source (file or snapshot source), the parser and an
//! aggregation cache behind a single `get()`. A failed call returns the error
//! for that call only; cache state from earlier calls is left untouched.

pub mod file;
pub mod mock;
pub mod poll;
pub mod source;
pub mod url;

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::AggregationCache;
use crate::clock::SharedClock;
use crate::config::{FileMode, ViewerConfig};
use crate::error::{Error, Result};
use crate::fetcher::FileBatchReader;
use crate::models::Series;
use crate::parser::Parser;

pub use file::FileProvider;
pub use mock::MockDataProvider;
pub use poll::{run_polling, PollUpdate};
pub use source::{Auth, HttpSnapshotSource, SnapshotSource};
pub use url::UrlProvider;

#[async_trait]
pub trait Provider: Send {
    /// Current windowed, aggregated and filtered series
    async fn get(&mut self) -> Result<Vec<Series>>;

    /// Human readable source description for status lines
    fn describe(&self) -> String;
}

/// Aggregation cache configured from the window, label policy and filter settings
pub fn aggregation_cache(config: &ViewerConfig, clock: SharedClock) -> Result<AggregationCache> {
    let mut cache = AggregationCache::new(config.time_window(), clock)
        .with_label_policy(config.label_policy()?);
    if let Some(filter) = config.filter_regex()? {
        cache = cache.with_filter(filter);
    }
    Ok(cache)
}

/// Build the provider for `config`
///
/// Mock data wins when `MOCK_METRICS_DATA=true`, then a configured file, then
/// `source`.
///
/// # Errors
/// Returns a configuration error when neither a file nor a source is available,
/// or when the label policy or filter is invalid.
pub fn new(
    config: &ViewerConfig,
    source: Option<Arc<dyn SnapshotSource>>,
    clock: SharedClock,
) -> Result<Box<dyn Provider>> {
    build(config, source, clock, mock::enabled())
}

fn build(
    config: &ViewerConfig,
    source: Option<Arc<dyn SnapshotSource>>,
    clock: SharedClock,
    use_mock: bool,
) -> Result<Box<dyn Provider>> {
    if use_mock {
        tracing::info!("Using mock metrics data");
        return Ok(Box::new(MockDataProvider::new(clock)));
    }

    let parser = Parser::new(clock.clone());
    let cache = aggregation_cache(config, clock)?;

    if let Some(path) = &config.file {
        let provider = match config.file_mode {
            FileMode::Snapshot => FileProvider::snapshot(path.clone(), parser, cache),
            FileMode::Tail => {
                let reader = FileBatchReader::new(path.clone(), parser, config.batch_limits());
                FileProvider::tail(reader, cache, config.batch_budget())
            }
        };
        return Ok(Box::new(provider));
    }

    if let Some(source) = source {
        return Ok(Box::new(UrlProvider::new(source, parser, cache)));
    }

    Err(Error::Config(
        "could not create provider - file or url are mandatory".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::path::PathBuf;

    fn clock() -> SharedClock {
        Arc::new(ManualClock::at_epoch())
    }

    #[test]
    fn test_requires_file_or_source() {
        let err = build(&ViewerConfig::default(), None, clock(), false).err().unwrap();
        assert!(err.to_string().contains("file or url are mandatory"));
    }

    #[test]
    fn test_mock_takes_precedence() {
        let provider = build(&ViewerConfig::default(), None, clock(), true).unwrap();
        assert_eq!(provider.describe(), "mock data");
    }

    #[test]
    fn test_file_before_source() {
        let config = ViewerConfig {
            file: Some(PathBuf::from("metrics.log")),
            ..Default::default()
        };
        let source: Arc<dyn SnapshotSource> =
            Arc::new(HttpSnapshotSource::new("http://localhost/metrics", Auth::None));
        let provider = build(&config, Some(source), clock(), false).unwrap();
        assert_eq!(provider.describe(), "file: metrics.log");
    }

    #[test]
    fn test_url_source() {
        let source: Arc<dyn SnapshotSource> =
            Arc::new(HttpSnapshotSource::new("http://localhost/metrics", Auth::None));
        let provider = build(&ViewerConfig::default(), Some(source), clock(), false).unwrap();
        assert_eq!(provider.describe(), "url: http://localhost/metrics, user: ");
    }

    #[test]
    fn test_invalid_policy_rejected_at_construction() {
        let config = ViewerConfig {
            file: Some(PathBuf::from("metrics.log")),
            aggregate_ignore_labels: "NONE,ALL".to_string(),
            ..Default::default()
        };
        assert!(build(&config, None, clock(), false).is_err());
    }
}
