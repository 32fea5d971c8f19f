//! Caches sitting between the parser and the consumers
//!
//! - [`AggregationCache`]: merges batches into windowed, label-aggregated histories
//! - [`StalenessCache`]: keeps vanished series visible for a grace period
//! - [`LabelPolicy`]: generates aggregated series names from labels

pub mod aggregation;
pub mod labels;
pub mod staleness;

pub use aggregation::{filter_by_time_window, AggregationCache};
pub use labels::{IgnoreLabels, LabelPolicy, IGNORE_ALL, IGNORE_NONE};
pub use staleness::StalenessCache;
