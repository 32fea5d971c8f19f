//! Shared value types for parsed metrics
//!
//! A [`Sample`] is one observed point; a [`Series`] groups the samples that share
//! an identity. `key` is the metric family name and never changes, while `name`
//! is the display identity that label aggregation may rewrite.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One observed point of a metric
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            labels: HashMap::new(),
            timestamp,
        }
    }

    /// Builder-style helper, mostly used by tests and the mock provider
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }
}

/// A named group of samples
///
/// Samples are kept ascending by timestamp. Within any batch returned by this
/// crate, series are sorted by `name` and names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: String,
    pub name: String,
    pub description: String,
    pub samples: Vec<Sample>,
}

impl Series {
    /// Create an empty series whose display name equals its key
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            description: String::new(),
            samples: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_samples(mut self, samples: Vec<Sample>) -> Self {
        self.samples = samples;
        self
    }

    /// Stable sort of samples by timestamp; ties keep their relative order
    pub fn sort_samples(&mut self) {
        self.samples.sort_by_key(|s| s.timestamp);
    }
}

/// Stable sort of a batch by series name
pub fn sort_by_name(batch: &mut [Series]) {
    batch.sort_by(|a, b| a.name.cmp(&b.name));
}

/// Total number of samples retained by a batch
pub fn sample_count(batch: &[Series]) -> usize {
    batch.iter().map(|s| s.samples.len()).sum()
}

/// Merge `incoming` into `target` by series name
///
/// Samples of an already-present name are appended; unknown names are pushed as
/// new series. Used to join the per-entry results of a drained batch.
pub fn merge_by_name(target: &mut Vec<Series>, incoming: Vec<Series>) {
    for series in incoming {
        match target.iter_mut().find(|s| s.name == series.name) {
            Some(existing) => {
                if existing.description.is_empty() {
                    existing.description = series.description;
                }
                existing.samples.extend(series.samples);
            }
            None => target.push(series),
        }
    }
}
