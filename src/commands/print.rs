//! Print command implementation
//!
//! Streams entries from a file or URL fetcher to stdout, optionally filtered
//! by series name and converted to csv.

use anyhow::Result;
use std::time::Duration;

use metrics_viewer::{
    clock,
    config::ViewerConfig,
    fetcher::EntryFetcher,
    parser::Parser,
    printer::{self, EntryFilter, OutputFormat},
};

/// Idle time after which a held-back csv row is written
const IDLE_FLUSH: Duration = Duration::from_millis(50);

/// Execute the print command
pub async fn execute(
    config: ViewerConfig,
    format: OutputFormat,
    metrics: Option<String>,
    no_header: bool,
) -> Result<()> {
    let parser = Parser::new(clock::system());
    let policy = config.label_policy()?;
    let mut printer = printer::new_printer(
        format,
        std::io::stdout(),
        printer::split_metric_names(metrics.as_deref().unwrap_or_default()),
        policy.clone(),
        parser.clone(),
        no_header,
    )?;
    let filter = EntryFilter::new(config.filter_regex()?, policy, parser);

    let cancel = super::shutdown_token();
    let mut fetcher = if let Some(path) = &config.file {
        EntryFetcher::tail_file(path.clone(), config.tail_poll(), &cancel)
    } else if let Some(source) = config.snapshot_source()? {
        EntryFetcher::poll_url(source, config.interval(), &cancel)
    } else {
        anyhow::bail!("could not create fetcher - file or url are mandatory");
    };

    loop {
        match tokio::time::timeout(IDLE_FLUSH, fetcher.next_entry()).await {
            Err(_) => printer.flush_pending()?,
            Ok(None) => break,
            Ok(Some(entry)) => {
                if !filter.matches(&entry) {
                    continue;
                }
                if let Err(e) = printer.print(&entry) {
                    tracing::debug!(error = %e, "Failed to print entry");
                }
            }
        }
    }

    printer.flush_pending()?;
    fetcher.close().await;
    Ok(())
}
