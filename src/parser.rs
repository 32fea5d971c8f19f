//! OpenMetrics / Prometheus text format parsing
//!
//! Turns one exposition-format text blob into a batch of [`Series`], one per
//! gauge, counter or untyped metric family. Sample lines are read by
//! `prometheus_parse::Scrape`; a strict line check runs first so malformed
//! input is reported instead of silently dropped (a second HELP line for a
//! family is an error). When that check fails the text is parsed once more with
//! every `#` comment line removed, which recovers the malformed-comment inputs
//! seen in the wild.

use chrono::{DateTime, Utc};
use prometheus_parse::{Scrape, Value};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::clock::SharedClock;
use crate::error::{Error, ParseError, Result};
use crate::models::{sort_by_name, Sample, Series};

/// Metric family type as declared by a `# TYPE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            "summary" => Some(Self::Summary),
            "untyped" => Some(Self::Untyped),
            _ => None,
        }
    }

    fn is_supported(self) -> bool {
        matches!(self, Self::Counter | Self::Gauge | Self::Untyped)
    }
}

/// Exposition text parser
///
/// Samples without an explicit timestamp are stamped with the injected clock's
/// "now", read once per call so one snapshot shares a single instant.
#[derive(Clone)]
pub struct Parser {
    clock: SharedClock,
}

impl Parser {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Parse a raw blob into a batch sorted by name
    ///
    /// The batch is all-or-nothing: if both the strict parse and the
    /// comment-stripped retry fail, both errors are returned.
    pub fn parse(&self, raw: &[u8]) -> Result<Vec<Series>> {
        let text = decode(raw);
        let now = self.clock.now();

        let (scrape, types) = match scrape(&text, now) {
            Ok(parsed) => parsed,
            Err(original) => {
                debug!(error = %original, "Retrying metrics parse without comment lines");
                scrape(&strip_comments(&text), now).map_err(|retry| Error::Parse {
                    original,
                    retry,
                })?
            }
        };

        Ok(into_series(scrape, &types))
    }
}

/// Declared family types, keyed by family name
type DeclaredTypes = HashMap<String, MetricType>;

fn decode(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(e) => {
            debug!(error = %e, "Metrics input is not valid UTF-8, replacing invalid sequences");
            String::from_utf8_lossy(raw)
        }
    }
}

fn scrape(text: &str, now: DateTime<Utc>) -> std::result::Result<(Scrape, DeclaredTypes), ParseError> {
    let types = check_lines(text)?;
    let lines = text.lines().map(|s| Ok(s.trim().to_owned()));
    let scrape = Scrape::parse_at(lines, now).map_err(|e| ParseError::new(0, e.to_string()))?;
    Ok((scrape, types))
}

/// Strict pass over the raw lines
///
/// Rejects repeated HELP or TYPE lines, TYPE lines after the family's samples,
/// unknown types and sample lines whose value or timestamp does not parse.
/// Label syntax is left to `prometheus_parse`.
fn check_lines(text: &str) -> std::result::Result<DeclaredTypes, ParseError> {
    let mut types = DeclaredTypes::new();
    let mut helps = HashSet::new();
    let mut sampled = HashSet::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix('#') {
            Some(comment) => check_comment(comment, line_no, &mut types, &mut helps, &sampled)?,
            None => {
                sampled.insert(check_sample(line, line_no)?);
            }
        }
    }

    Ok(types)
}

fn check_comment<'a>(
    comment: &'a str,
    line_no: usize,
    types: &mut DeclaredTypes,
    helps: &mut HashSet<&'a str>,
    sampled: &HashSet<&str>,
) -> std::result::Result<(), ParseError> {
    let mut tokens = comment.split_whitespace();
    let keyword = tokens.next().unwrap_or_default();
    if keyword != "HELP" && keyword != "TYPE" {
        return Ok(());
    }

    let name = tokens.next().unwrap_or_default();
    if !is_metric_name(name) {
        return Err(ParseError::new(line_no, "invalid metric name in comment"));
    }

    if keyword == "HELP" {
        if !helps.insert(name) {
            return Err(ParseError::new(
                line_no,
                format!("second HELP line for metric name {:?}", name),
            ));
        }
        return Ok(());
    }

    if types.contains_key(name) || sampled.contains(name) {
        return Err(ParseError::new(
            line_no,
            format!(
                "second TYPE line for metric name {:?}, or TYPE reported after samples",
                name
            ),
        ));
    }
    let type_token = tokens.next().unwrap_or_default();
    let kind = MetricType::from_token(type_token).ok_or_else(|| {
        ParseError::new(line_no, format!("unknown metric type {:?}", type_token))
    })?;
    types.insert(name.to_string(), kind);
    Ok(())
}

/// Check one sample line and return its metric name
fn check_sample(line: &str, line_no: usize) -> std::result::Result<&str, ParseError> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_metric_name(name) {
        return Err(ParseError::new(line_no, "invalid metric name"));
    }

    let mut rest = &line[name_end..];
    if rest.starts_with('{') {
        let close = rest.rfind('}').ok_or_else(|| {
            ParseError::new(line_no, format!("unclosed label set for metric {:?}", name))
        })?;
        rest = &rest[close + 1..];
    }

    let mut tokens = rest.split_whitespace();
    let value = tokens.next().unwrap_or_default();
    if value.parse::<f64>().is_err() {
        return Err(ParseError::new(
            line_no,
            format!("expected float as value, got {:?}", value),
        ));
    }
    if let Some(ts) = tokens.next() {
        if ts.parse::<i64>().is_err() {
            return Err(ParseError::new(
                line_no,
                format!("expected integer as timestamp, got {:?}", ts),
            ));
        }
    }
    if let Some(extra) = tokens.next() {
        return Err(ParseError::new(
            line_no,
            format!("spurious string after timestamp: {:?}", extra),
        ));
    }
    Ok(name)
}

fn is_metric_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().enumerate().all(|(i, c)| {
            c.is_ascii_alphabetic() || c == '_' || c == ':' || (i > 0 && c.is_ascii_digit())
        })
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines().filter(|line| !line.trim_start().starts_with('#')) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Declared type of the family `metric` belongs to
///
/// `foo_bucket`, `foo_sum` and `foo_count` belong to `foo` when `foo` was
/// declared a histogram (or a summary, except for `_bucket`).
fn family_type(types: &DeclaredTypes, metric: &str) -> Option<MetricType> {
    if let Some(&kind) = types.get(metric) {
        return Some(kind);
    }
    ["_bucket", "_sum", "_count"].into_iter().find_map(|suffix| {
        let base = metric.strip_suffix(suffix)?;
        match types.get(base)? {
            MetricType::Histogram => Some(MetricType::Histogram),
            MetricType::Summary if suffix != "_bucket" => Some(MetricType::Summary),
            _ => None,
        }
    })
}

fn into_series(scrape: Scrape, types: &DeclaredTypes) -> Vec<Series> {
    let mut batch: Vec<Series> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = BTreeSet::new();

    for sample in scrape.samples {
        let value = match sample.value {
            Value::Counter(v) | Value::Gauge(v) | Value::Untyped(v) => v,
            _ => {
                skipped.insert(sample.metric);
                continue;
            }
        };
        if family_type(types, &sample.metric).is_some_and(|kind| !kind.is_supported()) {
            skipped.insert(sample.metric);
            continue;
        }

        let idx = match index.get(&sample.metric) {
            Some(&idx) => idx,
            None => {
                let description = scrape.docs.get(&sample.metric).cloned().unwrap_or_default();
                batch.push(Series::new(sample.metric.clone()).with_description(description));
                index.insert(sample.metric.clone(), batch.len() - 1);
                batch.len() - 1
            }
        };
        batch[idx].samples.push(Sample {
            value,
            labels: sample
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timestamp: sample.timestamp,
        });
    }

    for metric in skipped {
        debug!(metric = %metric, "Skipping metric with unsupported type");
    }

    for series in &mut batch {
        series.sort_samples();
    }
    sort_by_name(&mut batch);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn parser_at(millis: i64) -> Parser {
        let clock = ManualClock::at_epoch();
        clock.advance(chrono::Duration::milliseconds(millis));
        Parser::new(Arc::new(clock))
    }

    #[test]
    fn test_parse_timestamped_samples_in_order() {
        let batch = parser_at(0).parse(b"foo 1.0 1000\nfoo 2.0 2000\n").unwrap();

        assert_eq!(batch.len(), 1);
        let foo = &batch[0];
        assert_eq!(foo.name, "foo");
        assert_eq!(foo.key, "foo");
        assert_eq!(foo.samples.len(), 2);
        assert_eq!(foo.samples[0].timestamp.timestamp(), 1);
        assert_eq!(foo.samples[0].value, 1.0);
        assert_eq!(foo.samples[1].timestamp.timestamp(), 2);
        assert_eq!(foo.samples[1].value, 2.0);
    }

    #[test]
    fn test_parse_help_and_type() {
        let text = "# HELP jfrt_runtime_heap_freememory_bytes Free Memory\n\
                    # TYPE jfrt_runtime_heap_freememory_bytes gauge\n\
                    jfrt_runtime_heap_freememory_bytes 8.23394e+08 1606400000000\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].description, "Free Memory");
        assert_eq!(batch[0].samples[0].value, 8.23394e+08);
    }

    #[test]
    fn test_untimed_samples_use_clock() {
        let batch = parser_at(42_000).parse(b"up 1\n").unwrap();
        assert_eq!(batch[0].samples[0].timestamp.timestamp_millis(), 42_000);
    }

    #[test]
    fn test_output_sorted_by_name_and_timestamp() {
        let text = "zeta 1 3000\nalpha 1 2000\nzeta 2 1000\nalpha 2 1000\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        let names: Vec<&str> = batch.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        for series in &batch {
            assert!(series
                .samples
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp));
        }
        assert_eq!(batch[1].samples[0].value, 2.0);
    }

    #[test]
    fn test_histogram_and_summary_families_are_skipped() {
        let text = "# TYPE req_seconds histogram\n\
                    req_seconds_bucket{le=\"0.1\"} 3\n\
                    req_seconds_bucket{le=\"+Inf\"} 5\n\
                    req_seconds_sum 0.7\n\
                    req_seconds_count 5\n\
                    # TYPE rpc summary\n\
                    rpc{quantile=\"0.5\"} 1\n\
                    rpc_sum 10\n\
                    rpc_count 4\n\
                    # TYPE requests_total counter\n\
                    requests_total 12\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        let names: Vec<&str> = batch.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["requests_total"]);
    }

    #[test]
    fn test_labels_are_kept_per_sample() {
        let text = "http_requests{method=\"GET\",path=\"/api/v1\"} 7\n\
                    http_requests{method=\"POST\",empty=\"\"} 2\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        assert_eq!(batch.len(), 1);
        let get = batch[0]
            .samples
            .iter()
            .find(|s| s.labels.get("method").map(String::as_str) == Some("GET"))
            .unwrap();
        assert_eq!(get.value, 7.0);
        assert_eq!(get.labels.get("path").unwrap(), "/api/v1");
    }

    #[test]
    fn test_special_float_values() {
        let text = "a NaN\nb +Inf\nc -Inf\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        assert!(batch[0].samples[0].value.is_nan());
        assert_eq!(batch[1].samples[0].value, f64::INFINITY);
        assert_eq!(batch[2].samples[0].value, f64::NEG_INFINITY);
    }

    #[test]
    fn test_duplicate_help_recovers_without_comments() {
        let text = "# HELP foo first\n# HELP foo second\n# TYPE foo gauge\nfoo 1 1000\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "foo");
        assert!(batch[0].description.is_empty());
        assert_eq!(batch[0].samples[0].value, 1.0);
    }

    #[test]
    fn test_indented_duplicate_help_recovers_without_comments() {
        let text = "  # HELP foo first\n  # HELP foo second\nfoo 1 1000\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].samples[0].value, 1.0);
    }

    #[test]
    fn test_type_after_samples_recovers_without_comments() {
        let text = "foo 1\n# TYPE foo gauge\n";
        let batch = parser_at(0).parse(text.as_bytes()).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_both_attempts_fail() {
        let err = parser_at(0).parse(b"# HELP foo a\nfoo abc\n").unwrap_err();
        match err {
            Error::Parse { original, retry } => {
                assert_eq!(original.line, 2);
                assert_eq!(retry.line, 1);
                assert!(retry.message.contains("expected float"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unclosed_label_set_fails() {
        assert!(parser_at(0).parse(b"foo{bar=\"x\" 1\n").is_err());
        assert!(parser_at(0).parse(b"1foo 1\n").is_err());
    }

    #[test]
    fn test_trailing_garbage_fails() {
        assert!(parser_at(0).parse(b"foo 1 1000 extra\n").is_err());
        assert!(parser_at(0).parse(b"foo 1 1.5\n").is_err());
    }

    #[test]
    fn test_unknown_type_recovers_without_comments() {
        let batch = parser_at(0).parse(b"# TYPE foo weird\nfoo 3\n").unwrap();
        assert_eq!(batch[0].samples[0].value, 3.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(parser_at(0).parse(b"").unwrap().is_empty());
        assert!(parser_at(0).parse(b"\n# just a comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut raw = b"jobs{queue=\"a".to_vec();
        raw.push(0xff);
        raw.extend_from_slice(b"\"} 4 1000\n");
        let batch = parser_at(0).parse(&raw).unwrap();

        assert_eq!(batch[0].samples[0].value, 4.0);
        assert_eq!(batch[0].samples[0].labels.get("queue").unwrap(), "a\u{FFFD}");
    }
}
