//! Output writers for the print command
//!
//! - [`OpenMetricsPrinter`]: echoes each entry as-is
//! - [`CsvPrinter`]: one row per timestamp, one column per selected series

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::io::Write;

use crate::cache::LabelPolicy;
use crate::error::{Error, Result};
use crate::parser::Parser;

/// Supported print formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[value(name = "open-metrics")]
    OpenMetrics,
    #[value(name = "csv")]
    Csv,
}

pub trait Printer: Send {
    /// Write one entry
    fn print(&mut self, entry: &str) -> Result<()>;

    /// Write anything held back waiting for more values
    fn flush_pending(&mut self) -> Result<()>;
}

/// Build the printer for `format`
///
/// # Errors
/// CSV output needs at least one metric name.
pub fn new_printer<W: Write + Send + 'static>(
    format: OutputFormat,
    writer: W,
    metrics: Vec<String>,
    policy: LabelPolicy,
    parser: Parser,
    no_header: bool,
) -> Result<Box<dyn Printer>> {
    match format {
        OutputFormat::OpenMetrics => Ok(Box::new(OpenMetricsPrinter::new(writer))),
        OutputFormat::Csv => {
            if metrics.is_empty() {
                return Err(Error::Config(
                    "--metrics is required when output format is csv".to_string(),
                ));
            }
            Ok(Box::new(CsvPrinter::new(
                writer, metrics, policy, parser, no_header,
            )))
        }
    }
}

pub struct OpenMetricsPrinter<W> {
    writer: W,
}

impl<W: Write> OpenMetricsPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> Printer for OpenMetricsPrinter<W> {
    fn print(&mut self, entry: &str) -> Result<()> {
        writeln!(self.writer, "{}", entry)?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Values sharing one timestamp
#[derive(Debug)]
struct CsvRecord {
    ts: DateTime<Utc>,
    values: Vec<Option<f64>>,
}

impl CsvRecord {
    fn new(ts: DateTime<Utc>, columns: usize) -> Self {
        Self {
            ts,
            values: vec![None; columns],
        }
    }

    fn is_full(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.values.len() + 1);
        fields.push(self.ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string());
        fields.extend(
            self.values
                .iter()
                .map(|v| v.map(|v| format!("{:.6}", v)).unwrap_or_default()),
        );
        fields
    }
}

/// CSV writer grouping values by timestamp
///
/// A row is written when a value with a different timestamp arrives, when the
/// row is full, or when a column of the row would be overwritten. The last row
/// is held until [`Printer::flush_pending`].
pub struct CsvPrinter<W> {
    writer: W,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    policy: LabelPolicy,
    parser: Parser,
    header_pending: bool,
    record: Option<CsvRecord>,
}

impl<W: Write> CsvPrinter<W> {
    pub fn new(
        writer: W,
        columns: Vec<String>,
        policy: LabelPolicy,
        parser: Parser,
        no_header: bool,
    ) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            writer,
            columns,
            index,
            policy,
            parser,
            header_pending: !no_header,
            record: None,
        }
    }

    fn write_row(&mut self, fields: &[String]) -> Result<()> {
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(self.writer, "{}", line.join(","))?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_pending {
            return Ok(());
        }
        self.header_pending = false;
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push("timestamp".to_string());
        header.extend(self.columns.iter().cloned());
        self.write_row(&header)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_record(&mut self) -> Result<()> {
        if let Some(record) = self.record.take() {
            self.write_row(&record.fields())?;
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl<W: Write + Send> Printer for CsvPrinter<W> {
    fn print(&mut self, entry: &str) -> Result<()> {
        self.write_header()?;
        let batch = self.policy.aggregate(self.parser.parse(entry.as_bytes())?);

        for series in batch {
            let Some(&column) = self.index.get(&series.name) else {
                continue;
            };
            for sample in series.samples {
                let flush = self.record.as_ref().is_some_and(|r| {
                    r.ts != sample.timestamp || r.is_full() || r.values[column].is_some()
                });
                if flush {
                    self.write_record()?;
                }
                let columns = self.columns.len();
                let record = self
                    .record
                    .get_or_insert_with(|| CsvRecord::new(sample.timestamp, columns));
                record.values[column] = Some(sample.value);
            }
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        self.write_record()
    }
}

/// Quote a CSV field when it holds a delimiter, quote or line break
fn csv_field(field: &str) -> String {
    let needs_quotes = field.starts_with(' ')
        || field.contains(|c| matches!(c, ',' | '"' | '\r' | '\n'));
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split a comma separated list of series names, keeping commas inside `{...}`
pub fn split_metric_names(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    if !s.contains('{') {
        return s.split(',').map(str::to_string).collect();
    }

    let mut values = Vec::new();
    let mut value = String::new();
    let mut in_braces = false;
    for c in s.chars() {
        match c {
            '{' => {
                in_braces = true;
                value.push(c);
            }
            '}' => {
                in_braces = false;
                value.push(c);
            }
            ',' if !in_braces => values.push(std::mem::take(&mut value)),
            _ => value.push(c),
        }
    }
    if !value.is_empty() {
        values.push(value);
    }
    values
}

/// Decides which entries the print command writes
///
/// An entry passes when any of its series, named by the label policy, matches
/// the filter. Entries that fail to parse never pass a filter.
pub struct EntryFilter {
    filter: Option<Regex>,
    policy: LabelPolicy,
    parser: Parser,
}

impl EntryFilter {
    pub fn new(filter: Option<Regex>, policy: LabelPolicy, parser: Parser) -> Self {
        Self {
            filter,
            policy,
            parser,
        }
    }

    pub fn matches(&self, entry: &str) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        match self.parser.parse(entry.as_bytes()) {
            Ok(batch) => self
                .policy
                .aggregate(batch)
                .iter()
                .any(|series| filter.is_match(&series.name)),
            Err(e) => {
                tracing::debug!(error = %e, "Entry did not parse, filtering it out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::{Arc, Mutex};

    /// Writer handing its bytes to the test after the printer took ownership
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn parser() -> Parser {
        Parser::new(Arc::new(ManualClock::at_epoch()))
    }

    fn csv_printer(buf: SharedBuf, metrics: &str, no_header: bool) -> CsvPrinter<SharedBuf> {
        CsvPrinter::new(
            buf,
            split_metric_names(metrics),
            LabelPolicy::parse("start,end,status", ",").unwrap(),
            parser(),
            no_header,
        )
    }

    #[test]
    fn test_open_metrics_echoes_entry() {
        let buf = SharedBuf::default();
        let mut printer = OpenMetricsPrinter::new(buf.clone());
        printer.print("foo 1\n").unwrap();
        assert_eq!(buf.text(), "foo 1\n\n");
    }

    #[test]
    fn test_csv_groups_values_by_timestamp() {
        let buf = SharedBuf::default();
        let mut printer = csv_printer(buf.clone(), "a,b", false);

        printer.print("a 1 1000\n").unwrap();
        printer.print("b 2 1000\n").unwrap();
        printer.print("a 3 2000\n").unwrap();
        printer.flush_pending().unwrap();

        assert_eq!(
            buf.text(),
            "timestamp,a,b\n\
             1970-01-01T00:00:01.000,1.000000,2.000000\n\
             1970-01-01T00:00:02.000,3.000000,\n"
        );
    }

    #[test]
    fn test_csv_flushes_before_overwriting_slot() {
        let buf = SharedBuf::default();
        let mut printer = csv_printer(buf.clone(), "a,b", true);

        printer.print("a 1 1000\n").unwrap();
        printer.print("a 2 1000\n").unwrap();
        printer.flush_pending().unwrap();

        assert_eq!(
            buf.text(),
            "1970-01-01T00:00:01.000,1.000000,\n1970-01-01T00:00:01.000,2.000000,\n"
        );
    }

    #[test]
    fn test_csv_quotes_labelled_columns() {
        let buf = SharedBuf::default();
        let mut printer = csv_printer(buf.clone(), r#"req{method="GET"},up"#, false);

        printer
            .print("req{method=\"GET\",status=\"200\"} 5 1000\n")
            .unwrap();
        printer.print("ignored 1 1000\n").unwrap();
        printer.flush_pending().unwrap();

        let text = buf.text();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(r#"timestamp,"req{method=""GET""}",up"#));
        assert_eq!(lines.next(), Some("1970-01-01T00:00:01.000,5.000000,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_requires_metrics() {
        let result = new_printer(
            OutputFormat::Csv,
            SharedBuf::default(),
            Vec::new(),
            LabelPolicy::default(),
            parser(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_split_metric_names() {
        assert!(split_metric_names("").is_empty());
        assert_eq!(split_metric_names("a,b"), vec!["a", "b"]);
        assert_eq!(
            split_metric_names(r#"a{x="1",y="2"},b,c{z="3"}"#),
            vec![r#"a{x="1",y="2"}"#, "b", r#"c{z="3"}"#]
        );
    }

    #[test]
    fn test_entry_filter_uses_aggregated_names() {
        let policy = LabelPolicy::parse("status", ",").unwrap();
        let filter = EntryFilter::new(
            Some(Regex::new(r#"^req\{method="GET"\}$"#).unwrap()),
            policy.clone(),
            parser(),
        );
        assert!(filter.matches("req{method=\"GET\",status=\"200\"} 1\n"));
        assert!(!filter.matches("req{method=\"PUT\"} 1\n"));
        assert!(!filter.matches("garbage {\n"));

        let everything = EntryFilter::new(None, policy, parser());
        assert!(everything.matches("garbage {\n"));
    }
}
