//! Foreground polling loop
//!
//! Calls [`Provider::get`] on every interval tick, passes successful snapshots
//! through the [`StalenessCache`] and hands the result to the display layer as
//! an owned copy. The loop owns both caches; nothing else mutates them.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Provider;
use crate::cache::StalenessCache;
use crate::clock::SharedClock;
use crate::models::Series;

/// Result of one poll, as seen by the consumer
#[derive(Debug)]
pub enum PollUpdate {
    Snapshot {
        series: Vec<Series>,
        at: DateTime<Utc>,
    },
    Failed {
        error: String,
        kind: &'static str,
    },
}

/// Poll `provider` until `cancel` fires or the consumer goes away
pub async fn run_polling(
    mut provider: Box<dyn Provider>,
    mut staleness: StalenessCache,
    clock: SharedClock,
    interval: Duration,
    tx: mpsc::Sender<PollUpdate>,
    cancel: CancellationToken,
) {
    let source = provider.describe();
    tracing::info!(source = %source, interval_ms = interval.as_millis() as u64, "Starting polling loop");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = provider.get() => result,
        };

        let update = match result {
            Ok(batch) => PollUpdate::Snapshot {
                series: staleness.add_to_metrics(batch),
                at: clock.now(),
            },
            Err(e) => {
                tracing::warn!(source = %source, error = %e, kind = e.kind(), "Failed to update metrics");
                PollUpdate::Failed {
                    error: e.to_string(),
                    kind: e.kind(),
                }
            }
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(update) => sent,
        };
        if sent.is_err() {
            break;
        }
    }

    tracing::info!(source = %source, "Polling loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays scripted results, then keeps returning empty batches
    struct ScriptedProvider {
        script: VecDeque<Result<Vec<Series>>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn get(&mut self) -> Result<Vec<Series>> {
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_failure_then_placeholder() {
        let clock = Arc::new(ManualClock::at_epoch());
        let provider = ScriptedProvider {
            script: VecDeque::from(vec![
                Ok(vec![Series::new("up")]),
                Err(Error::Source("boom".to_string())),
                Ok(Vec::new()),
            ]),
        };
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_polling(
            Box::new(provider),
            StalenessCache::new(clock.clone()),
            clock,
            Duration::from_millis(5),
            tx,
            cancel.clone(),
        ));

        match rx.recv().await.unwrap() {
            PollUpdate::Snapshot { series, .. } => assert_eq!(series[0].name, "up"),
            other => panic!("unexpected update: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            PollUpdate::Failed { kind, .. } => assert_eq!(kind, "fetch_error"),
            other => panic!("unexpected update: {:?}", other),
        }
        // Series vanished from the source but is still within max-stale
        match rx.recv().await.unwrap() {
            PollUpdate::Snapshot { series, .. } => {
                assert_eq!(series.len(), 1);
                assert!(series[0].samples.is_empty());
            }
            other => panic!("unexpected update: {:?}", other),
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_consumer_drops() {
        let clock = Arc::new(ManualClock::at_epoch());
        let provider = ScriptedProvider {
            script: VecDeque::new(),
        };
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = tokio::spawn(run_polling(
            Box::new(provider),
            StalenessCache::new(clock.clone()),
            clock,
            Duration::from_millis(5),
            tx,
            CancellationToken::new(),
        ));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
