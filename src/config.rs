use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::LabelPolicy;
use crate::error::{Error, Result};
use crate::fetcher::file::BatchLimits;
use crate::provider::source::{Auth, HttpSnapshotSource};

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "metrics-viewer.toml";

/// How a metrics file is read by the graph command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Follow the file and drain newly appended entries on every poll
    #[default]
    Tail,
    /// Re-read and re-parse the whole file on every poll
    Snapshot,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    // Source
    pub file: Option<PathBuf>,
    pub file_mode: FileMode,
    pub url: Option<String>,
    pub artifactory_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,

    // Pipeline
    pub interval_secs: u64,
    pub time_window_secs: u64,
    pub filter: Option<String>,
    pub aggregate_ignore_labels: String,
    pub label_delimiter: String,
    pub max_stale_secs: u64,

    // File batch drain
    pub max_batch_entries: usize,
    pub batch_budget_ratio: f64,
    pub max_backoff_ms: u64,
    pub tail_poll_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            file: None,
            file_mode: FileMode::Tail,
            url: None,
            artifactory_url: None,
            user: None,
            password: None,
            token: None,
            interval_secs: 5,
            time_window_secs: 300,
            filter: None,
            aggregate_ignore_labels: "start,end,status".to_string(),
            label_delimiter: LabelPolicy::DEFAULT_DELIMITER.to_string(),
            max_stale_secs: 3600,
            max_batch_entries: 10_000,
            batch_budget_ratio: 0.9,
            max_backoff_ms: 10,
            tail_poll_ms: 100,
        }
    }
}

impl ViewerConfig {
    /// Poll interval of the display loop and the URL fetcher
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn time_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.time_window_secs as i64)
    }

    pub fn max_stale(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_stale_secs as i64)
    }

    pub fn tail_poll(&self) -> Duration {
        Duration::from_millis(self.tail_poll_ms)
    }

    /// Time one file drain may take: a fraction of the poll interval
    pub fn batch_budget(&self) -> Duration {
        self.interval().mul_f64(self.batch_budget_ratio)
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_entries: self.max_batch_entries,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn label_policy(&self) -> Result<LabelPolicy> {
        LabelPolicy::parse(&self.aggregate_ignore_labels, &self.label_delimiter)
    }

    pub fn filter_regex(&self) -> Result<Option<Regex>> {
        self.filter
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|f| {
                Regex::new(f).map_err(|e| Error::Config(format!("invalid filter '{}': {}", f, e)))
            })
            .transpose()
    }

    /// HTTP source described by the url/artifactory settings, if any
    ///
    /// # Errors
    /// Returns a configuration error when both a plain URL and an Artifactory
    /// URL are set, or when both basic credentials and a token are set.
    pub fn snapshot_source(&self) -> Result<Option<HttpSnapshotSource>> {
        let auth = Auth::from_credentials(
            self.user.clone(),
            self.password.clone(),
            self.token.clone(),
        )?;
        match (&self.url, &self.artifactory_url) {
            (Some(_), Some(_)) => Err(Error::Config(
                "url and artifactory_url are mutually exclusive".to_string(),
            )),
            (Some(url), None) => Ok(Some(HttpSnapshotSource::new(url.clone(), auth))),
            (None, Some(base)) => Ok(Some(HttpSnapshotSource::artifactory(base, auth))),
            (None, None) => Ok(None),
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::Config("interval must be at least 1 second".to_string()));
        }
        if self.time_window_secs == 0 {
            return Err(Error::Config("time window must be at least 1 second".to_string()));
        }
        if !(self.batch_budget_ratio > 0.0 && self.batch_budget_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "batch_budget_ratio must be in (0, 1], got {}",
                self.batch_budget_ratio
            )));
        }
        if self.max_batch_entries == 0 {
            return Err(Error::Config("max_batch_entries must be positive".to_string()));
        }
        if self.file.is_some() && (self.url.is_some() || self.artifactory_url.is_some()) {
            return Err(Error::Config(
                "a metrics file and a metrics URL cannot be used together".to_string(),
            ));
        }

        self.label_policy()?;
        self.filter_regex()?;
        self.snapshot_source()?;
        Ok(())
    }
}

/// Load configuration from an optional TOML file and the environment
///
/// The file defaults to [`DEFAULT_CONFIG_FILE`] and may be absent. Environment
/// variables use the `METRICS_VIEWER` prefix with `__` separators, e.g.
/// `METRICS_VIEWER__TIME_WINDOW_SECS=600`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ViewerConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let config = config::Config::builder()
        .add_source(config::File::from(path).required(required))
        .add_source(config::Environment::with_prefix("METRICS_VIEWER").separator("__"))
        .build()?;

    let cfg: ViewerConfig = config.try_deserialize()?;
    Ok(cfg)
}
