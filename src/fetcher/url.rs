//! Interval-driven URL entry fetching

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{send_entry, split_entries};
use crate::provider::source::SnapshotSource;

/// Producer loop of a streaming URL fetcher
///
/// A failed fetch is logged and retried on the next tick. Cancellation is
/// observed while waiting for a tick, during the fetch and between entries of
/// one snapshot.
pub(crate) async fn stream_entries<S>(
    source: S,
    interval: Duration,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) where
    S: SnapshotSource,
{
    tracing::info!(source = %source, interval_ms = interval.as_millis() as u64, "Starting URL entry fetcher");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    'outer: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            fetched = source.get() => fetched,
        };

        let data = match fetched {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(source = %source, error = %e, "Failed to fetch metrics");
                continue;
            }
        };

        let text = String::from_utf8_lossy(&data);
        for entry in split_entries(&text) {
            if !send_entry(&tx, &cancel, entry).await {
                break 'outer;
            }
        }
    }

    tracing::info!(source = %source, "URL entry fetcher stopped");
}
