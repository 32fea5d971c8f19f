use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use metrics_viewer::config::{FileMode, ViewerConfig};
use metrics_viewer::printer::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "metrics-viewer",
    version,
    about = "Visualize and print OpenMetrics data from a file or a URL"
)]
pub struct Cli {
    /// Configuration file path (defaults to metrics-viewer.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Graph metrics in an interactive terminal dashboard
    #[command(alias = "g")]
    Graph {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// How to read --file: follow appended entries or re-read the whole file
        #[arg(long, value_enum)]
        file_mode: Option<FileMode>,

        /// Write logs to this file (the dashboard owns the terminal)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Print and tail metrics in the terminal
    #[command(alias = "p")]
    Print {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "open-metrics")]
        format: OutputFormat,

        /// Comma separated list of metrics to collect (required for csv)
        #[arg(long)]
        metrics: Option<String>,

        /// Do not print the csv header line
        #[arg(long)]
        no_header: bool,
    },
}

/// Where metrics come from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Log file with the open metrics format
    #[arg(long, conflicts_with_all = ["url", "artifactory_url"])]
    pub file: Option<PathBuf>,

    /// Url endpoint to use to get metrics
    #[arg(long, conflicts_with = "artifactory_url")]
    pub url: Option<String>,

    /// Artifactory base URL; metrics are read from <url>/api/v1/metrics
    #[arg(long)]
    pub artifactory_url: Option<String>,

    /// Username for url requiring authentication (see --password)
    #[arg(long)]
    pub user: Option<String>,

    /// Password for url requiring authentication (see --user)
    #[arg(long, requires = "user")]
    pub password: Option<String>,

    /// Access token for url requiring authentication
    #[arg(long, conflicts_with = "user")]
    pub token: Option<String>,
}

/// Pipeline tuning shared by both commands
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Scraping interval in seconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Time window to display in seconds
    #[arg(long)]
    pub time: Option<u64>,

    /// Regular expression to use for filtering the metrics
    #[arg(long)]
    pub filter: Option<String>,

    /// Comma delimited list of labels to ignore when aggregating metrics.
    /// Use 'ALL' or 'NONE' to ignore all or none of the labels.
    #[arg(long)]
    pub aggregate_ignore_labels: Option<String>,

    /// Delimiter between label pairs in aggregated series names
    #[arg(long)]
    pub label_delimiter: Option<String>,
}

impl SourceArgs {
    /// Override the configured source when any source flag is given
    pub fn apply(&self, cfg: &mut ViewerConfig) {
        if self.file.is_some() || self.url.is_some() || self.artifactory_url.is_some() {
            cfg.file = self.file.clone();
            cfg.url = self.url.clone();
            cfg.artifactory_url = self.artifactory_url.clone();
        }
        if self.user.is_some() || self.token.is_some() {
            cfg.user = self.user.clone();
            cfg.password = self.password.clone();
            cfg.token = self.token.clone();
        }
    }
}

impl PipelineArgs {
    pub fn apply(&self, cfg: &mut ViewerConfig) {
        if let Some(interval) = self.interval {
            cfg.interval_secs = interval;
        }
        if let Some(time) = self.time {
            cfg.time_window_secs = time;
        }
        if let Some(filter) = &self.filter {
            cfg.filter = Some(filter.clone());
        }
        if let Some(labels) = &self.aggregate_ignore_labels {
            cfg.aggregate_ignore_labels = labels.clone();
        }
        if let Some(delimiter) = &self.label_delimiter {
            cfg.label_delimiter = delimiter.clone();
        }
    }
}
