//! Grace period for vanished series
//!
//! Keeps a series that stopped appearing in fetched batches visible, as an empty
//! placeholder, until it has been absent for the configured max-stale duration.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

use crate::clock::SharedClock;
use crate::models::{sort_by_name, Series};

#[derive(Debug, Clone)]
struct StaleEntry {
    key: String,
    name: String,
    description: String,
    last_seen: DateTime<Utc>,
}

/// Tracks when each series name was last seen
pub struct StalenessCache {
    entries: HashMap<String, StaleEntry>,
    max_stale: Duration,
    clock: SharedClock,
}

impl StalenessCache {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_max_stale(Duration::hours(1), clock)
    }

    pub fn with_max_stale(max_stale: Duration, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            max_stale,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `batch` and append placeholders for recently vanished series
    pub fn add_to_metrics(&mut self, mut batch: Vec<Series>) -> Vec<Series> {
        let now = self.clock.now();
        let mut seen = HashSet::with_capacity(batch.len());

        for series in &batch {
            self.entries.insert(
                series.name.clone(),
                StaleEntry {
                    key: series.key.clone(),
                    name: series.name.clone(),
                    description: series.description.clone(),
                    last_seen: now,
                },
            );
            seen.insert(series.name.clone());
        }

        let cutoff = now - self.max_stale;
        self.entries.retain(|_, entry| entry.last_seen > cutoff);

        for entry in self.entries.values() {
            if seen.contains(&entry.name) {
                continue;
            }
            batch.push(Series {
                key: entry.key.clone(),
                name: entry.name.clone(),
                description: entry.description.clone(),
                samples: Vec::new(),
            });
        }

        sort_by_name(&mut batch);
        batch
    }
}
