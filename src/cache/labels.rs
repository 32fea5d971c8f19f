//! Label-based series naming
//!
//! A [`LabelPolicy`] turns a series key plus one sample's labels into the
//! display name that sample is aggregated under, e.g. `http_requests{method="GET"}`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::{sort_by_name, Series};

/// Sentinel that ignores every label
pub const IGNORE_ALL: &str = "ALL";
/// Sentinel that ignores no label
pub const IGNORE_NONE: &str = "NONE";

/// Which labels are left out of generated series names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreLabels {
    /// Collapse every sample of a key into one unlabeled series
    All,
    /// Keep every label
    None,
    /// Keep every label except these
    Set(BTreeSet<String>),
}

impl IgnoreLabels {
    fn ignores(&self, label: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Set(set) => set.contains(label),
        }
    }
}

impl FromStr for IgnoreLabels {
    type Err = Error;

    /// Parse a comma separated label list, honoring the `ALL` / `NONE` sentinels
    fn from_str(s: &str) -> Result<Self> {
        let labels: BTreeSet<String> = s
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        for sentinel in [IGNORE_ALL, IGNORE_NONE] {
            if labels.contains(sentinel) && labels.len() > 1 {
                return Err(Error::Config(format!(
                    "aggregate-ignore-labels: '{}' cannot be combined with other labels (got '{}')",
                    sentinel, s
                )));
            }
        }

        if labels.contains(IGNORE_ALL) {
            Ok(Self::All)
        } else if labels.contains(IGNORE_NONE) {
            Ok(Self::None)
        } else {
            Ok(Self::Set(labels))
        }
    }
}

impl fmt::Display for IgnoreLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(IGNORE_ALL),
            Self::None => f.write_str(IGNORE_NONE),
            Self::Set(set) => {
                let joined: Vec<&str> = set.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// Label aggregation policy: ignored labels plus the delimiter joining the rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    ignore: IgnoreLabels,
    delimiter: String,
}

impl LabelPolicy {
    pub const DEFAULT_DELIMITER: &'static str = ",";

    pub fn new(ignore: IgnoreLabels, delimiter: impl Into<String>) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(Error::Config("label delimiter cannot be empty".to_string()));
        }
        Ok(Self { ignore, delimiter })
    }

    /// Parse the ignore list and pair it with `delimiter`
    pub fn parse(ignore_list: &str, delimiter: &str) -> Result<Self> {
        Self::new(ignore_list.parse()?, delimiter)
    }

    pub fn ignore(&self) -> &IgnoreLabels {
        &self.ignore
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Generate the aggregated series name for one sample
    ///
    /// Label keys are sorted, so the result does not depend on map iteration
    /// order. Without remaining labels the name is the bare key.
    pub fn series_name(&self, key: &str, labels: &HashMap<String, String>) -> String {
        let mut kept: Vec<&String> = labels
            .keys()
            .filter(|label| !self.ignore.ignores(label))
            .collect();
        if kept.is_empty() {
            return key.to_string();
        }
        kept.sort();

        let pairs: Vec<String> = kept
            .into_iter()
            .map(|label| format!("{}=\"{}\"", label, labels[label]))
            .collect();
        format!("{}{{{}}}", key, pairs.join(&self.delimiter))
    }

    /// Regroup the samples of a batch under their generated names
    ///
    /// Names come from samples, so series without samples are dropped.
    /// Descriptions come from the first non-empty description seen for a name.
    pub fn aggregate(&self, batch: Vec<Series>) -> Vec<Series> {
        let mut merged: Vec<Series> = Vec::with_capacity(batch.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for series in batch {
            for sample in series.samples {
                let name = self.series_name(&series.key, &sample.labels);
                let idx = *index.entry(name).or_insert_with_key(|name| {
                    merged.push(Series {
                        key: series.key.clone(),
                        name: name.clone(),
                        description: String::new(),
                        samples: Vec::new(),
                    });
                    merged.len() - 1
                });
                let target = &mut merged[idx];
                if target.description.is_empty() && !series.description.is_empty() {
                    target.description = series.description.clone();
                }
                target.samples.push(sample);
            }
        }

        sort_by_name(&mut merged);
        merged
    }
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            ignore: IgnoreLabels::Set(BTreeSet::new()),
            delimiter: Self::DEFAULT_DELIMITER.to_string(),
        }
    }
}
