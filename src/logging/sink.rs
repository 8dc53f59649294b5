//! Record destinations

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

use super::record::LogRecord;

/// Destination for serialized records
///
/// Sinks never report failures to the logging call; a sink that cannot
/// deliver a record drops it.
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this sink wants the record at all
    fn accepts(&self, _record: &LogRecord) -> bool {
        true
    }

    /// `line` is the record already rendered as one JSON document
    fn write(&self, record: &LogRecord, line: &str);
}

/// One JSON document per line on stdout, or on any [`MakeWriter`]
pub struct ConsoleSink<W = fn() -> io::Stdout> {
    make_writer: W,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self {
            make_writer: io::stdout,
        }
    }
}

impl<W> ConsoleSink<W>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    pub fn with_writer(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<W> Sink for ConsoleSink<W>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "console"
    }

    fn write(&self, _record: &LogRecord, line: &str) {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        // Single write so concurrent records never interleave
        let mut writer = self.make_writer.make_writer();
        let _ = writer.write_all(buf.as_bytes());
        let _ = writer.flush();
    }
}

/// In-memory writer for capturing console output
#[derive(Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Every captured line parsed as JSON; unparsable lines are skipped
    pub fn json_lines(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

pub struct MemoryGuard<'a> {
    buf: MutexGuard<'a, Vec<u8>>,
}

impl Write for MemoryGuard<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemoryWriter {
    type Writer = MemoryGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MemoryGuard { buf: self.lock() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::level::Severity;
    use tracing::Level;

    #[test]
    fn test_console_sink_writes_one_line_per_record() {
        let writer = MemoryWriter::new();
        let sink = ConsoleSink::with_writer(writer.clone());
        let record = LogRecord::new(Severity::Named(Level::INFO), "hello", "app");

        sink.write(&record, r#"{"message":"hello"}"#);
        sink.write(&record, r#"{"message":"again"}"#);

        assert_eq!(
            writer.lines(),
            vec![r#"{"message":"hello"}"#, r#"{"message":"again"}"#]
        );
        assert_eq!(writer.json_lines()[1]["message"], "again");
    }

    #[test]
    fn test_console_sink_accepts_everything() {
        let sink = ConsoleSink::stdout();
        let record = LogRecord::new(Severity::Numeric(7), "x", "any");
        assert!(sink.accepts(&record));
        assert_eq!(sink.name(), "console");
    }
}
