//! Windowed aggregation cache
//!
//! Merges successive parsed batches into bounded per-series histories. Every
//! call appends new samples to the series they extend, drops samples that fell
//! out of the time window, regroups samples under their label-policy names and
//! applies the name filter. The result becomes the state for the next call.

use chrono::Duration;
use regex::Regex;
use std::collections::HashMap;

use crate::cache::labels::LabelPolicy;
use crate::clock::SharedClock;
use crate::models::{sample_count, Series};

/// Stateful merge of parsed batches
///
/// Not synchronized: one polling loop owns the cache and is its only caller.
#[derive(Clone)]
pub struct AggregationCache {
    window: Duration,
    labels: Option<LabelPolicy>,
    filter: Option<Regex>,
    clock: SharedClock,
    previous: Vec<Series>,
}

impl AggregationCache {
    /// Create a cache retaining samples newer than `window`
    pub fn new(window: Duration, clock: SharedClock) -> Self {
        Self {
            window,
            labels: None,
            filter: None,
            clock,
            previous: Vec::new(),
        }
    }

    /// Regroup samples under names generated by `policy`
    pub fn with_label_policy(mut self, policy: LabelPolicy) -> Self {
        self.labels = Some(policy);
        self
    }

    /// Keep only series whose name matches `filter`
    pub fn with_filter(mut self, filter: Regex) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Series from the last call that still hold samples
    pub fn snapshot(&self) -> &[Series] {
        &self.previous
    }

    /// Number of samples currently retained
    pub fn sample_count(&self) -> usize {
        sample_count(&self.previous)
    }

    /// Merge `batch` into the retained history and return the new state
    pub fn add(&mut self, batch: Vec<Series>) -> Vec<Series> {
        let index: HashMap<String, usize> = batch
            .iter()
            .enumerate()
            .map(|(i, series)| (series.name.clone(), i))
            .collect();
        let mut pending: Vec<Option<Series>> = batch.into_iter().map(Some).collect();

        let mut merged = Vec::with_capacity(self.previous.len() + pending.len());
        for mut series in std::mem::take(&mut self.previous) {
            if let Some(fresh) = index.get(&series.name).and_then(|&i| pending[i].take()) {
                if series.description.is_empty() {
                    series.description = fresh.description;
                }
                series.samples.extend(fresh.samples);
            }
            merged.push(series);
        }
        merged.extend(pending.into_iter().flatten());

        filter_by_time_window(&mut merged, self.clock.now() - self.window);

        if let Some(policy) = &self.labels {
            merged = policy.aggregate(merged);
        }

        if let Some(filter) = &self.filter {
            merged.retain(|series| filter.is_match(&series.name));
        }

        // Emptied series are reported once, never carried into the next add
        self.previous = merged
            .iter()
            .filter(|series| !series.samples.is_empty())
            .cloned()
            .collect();
        merged
    }
}

/// Drop every sample at or before `cutoff`
///
/// Series that end up empty are kept so consumers still see them.
pub fn filter_by_time_window(batch: &mut [Series], cutoff: chrono::DateTime<chrono::Utc>) {
    for series in batch.iter_mut() {
        series.samples.retain(|sample| sample.timestamp > cutoff);
    }
}
