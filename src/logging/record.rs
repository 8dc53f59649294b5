//! Structured log record and its JSON wire format
//!
//! One record renders to one JSON object:
//!
//! ```text
//! {"timestamp":1609459200.0,"time":"2021-01-01T00:00:00.000000+00:00","level":"INFO",
//!  "message":"...","name":"app::orders","function":"create","line":42,"path":"src/orders.rs",
//!  "exception":"ParseIntError: invalid digit found in string",   <- only with an exception
//!  "traceback":["..."],                                           <- only with a cause chain
//!  "extra":{"user_id":123}}                                       <- only when non-empty
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;

use super::callsite::CallSite;
use super::level::Severity;

/// Exception attached to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub kind: String,
    pub value: String,
    /// Messages of the `source()` chain, outermost first
    pub traceback: Vec<String>,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            traceback: Vec::new(),
        }
    }

    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut traceback = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            traceback.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: error_kind(err).to_string(),
            value: err.to_string(),
            traceback,
        }
    }

    /// `"<type>: <value>"`
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind, self.value)
    }
}

/// Type name of a type-erased error.
///
/// Only concrete types known to this crate and its dependencies can be
/// recovered through downcasting; everything else is reported as `Error`.
fn error_kind(err: &(dyn Error + 'static)) -> &'static str {
    macro_rules! known {
        ($($ty:ty => $name:literal),* $(,)?) => {
            $(if err.is::<$ty>() {
                return $name;
            })*
        };
    }

    known! {
        std::io::Error => "IoError",
        std::num::ParseIntError => "ParseIntError",
        std::num::ParseFloatError => "ParseFloatError",
        std::num::TryFromIntError => "TryFromIntError",
        std::net::AddrParseError => "AddrParseError",
        std::str::Utf8Error => "Utf8Error",
        std::string::FromUtf8Error => "FromUtf8Error",
        std::fmt::Error => "FmtError",
        chrono::ParseError => "ChronoParseError",
        serde_json::Error => "JsonError",
        ::config::ConfigError => "ConfigError",
        sqlx::Error => "SqlxError",
        crate::error::DbError => "DbError",
        crate::error::LoggingError => "LoggingError",
        crate::error::InvalidIdentifierFormat => "InvalidIdentifierFormat",
    }
    "Error"
}

/// One structured observability event
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub level: Severity,
    pub message: String,
    /// Logger name: the `log` target or tracing target
    pub name: String,
    pub function: String,
    pub line: u32,
    pub path: String,
    pub exception: Option<ExceptionInfo>,
    pub extra: Map<String, Value>,
}

impl LogRecord {
    pub fn new(level: Severity, message: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            level,
            message: message.into(),
            name: name.into(),
            function: String::new(),
            line: 0,
            path: String::new(),
            exception: None,
            extra: Map::new(),
        }
    }

    pub fn with_call_site(mut self, site: CallSite) -> Self {
        self.function = site.function;
        self.path = site.file;
        self.line = site.line;
        self
    }

    /// Seconds since the epoch with sub-second fraction
    pub fn timestamp(&self) -> f64 {
        self.time.timestamp() as f64 + f64::from(self.time.timestamp_subsec_micros()) / 1_000_000.0
    }

    /// ISO-8601 with an explicit UTC offset
    pub fn iso_time(&self) -> String {
        self.time.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// JSON document for this record
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.wire()).unwrap_or_else(|_| self.fallback_value())
    }

    fn wire(&self) -> WireRecord<'_> {
        let traceback = self
            .exception
            .as_ref()
            .map(|e| e.traceback.as_slice())
            .filter(|chain| !chain.is_empty());

        WireRecord {
            timestamp: self.timestamp(),
            time: self.iso_time(),
            level: self.level.name().into_owned(),
            message: &self.message,
            name: &self.name,
            function: &self.function,
            line: self.line,
            path: &self.path,
            exception: self.exception.as_ref().map(ExceptionInfo::summary),
            traceback,
            extra: &self.extra,
        }
    }

    /// Minimal document used if full serialization ever fails
    fn fallback_value(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("timestamp".into(), coerce_f64(self.timestamp()));
        doc.insert("time".into(), Value::String(self.iso_time()));
        doc.insert("level".into(), Value::String(self.level.name().into_owned()));
        doc.insert("message".into(), Value::String(self.message.clone()));
        doc.insert("name".into(), Value::String(self.name.clone()));
        doc.insert("function".into(), Value::String(self.function.clone()));
        doc.insert("line".into(), Value::from(self.line));
        doc.insert("path".into(), Value::String(self.path.clone()));
        if let Some(exception) = &self.exception {
            doc.insert("exception".into(), Value::String(exception.summary()));
        }
        if !self.extra.is_empty() {
            let extra = self
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.to_string())))
                .collect();
            doc.insert("extra".into(), Value::Object(extra));
        }
        Value::Object(doc)
    }
}

#[derive(Serialize)]
struct WireRecord<'a> {
    timestamp: f64,
    time: String,
    level: String,
    message: &'a str,
    name: &'a str,
    function: &'a str,
    line: u32,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    traceback: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    extra: &'a Map<String, Value>,
}

/// Render a record as one line of JSON. Never fails.
pub fn serialize(record: &LogRecord) -> String {
    match serde_json::to_string(&record.wire()) {
        Ok(line) => line,
        Err(_) => record.fallback_value().to_string(),
    }
}

/// Numbers JSON cannot hold (NaN, infinities) become strings
pub fn coerce_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracing::Level;

    fn sample_record() -> LogRecord {
        LogRecord {
            time: Utc.timestamp_opt(1609459200, 0).unwrap(),
            level: Severity::Named(Level::INFO),
            message: "Test message".to_string(),
            name: "test_logger".to_string(),
            function: "test_function".to_string(),
            line: 42,
            path: "/path/to/file.rs".to_string(),
            exception: None,
            extra: Map::new(),
        }
    }

    fn parse(record: &LogRecord) -> Value {
        serde_json::from_str(&serialize(record)).unwrap()
    }

    #[test]
    fn test_serialize_mandatory_fields() {
        let data = parse(&sample_record());

        assert_eq!(data["timestamp"], 1609459200.0);
        assert_eq!(data["time"], "2021-01-01T00:00:00.000000+00:00");
        assert_eq!(data["level"], "INFO");
        assert_eq!(data["message"], "Test message");
        assert_eq!(data["name"], "test_logger");
        assert_eq!(data["function"], "test_function");
        assert_eq!(data["line"], 42);
        assert_eq!(data["path"], "/path/to/file.rs");
    }

    #[test]
    fn test_serialize_omits_empty_optionals() {
        let data = parse(&sample_record());
        let object = data.as_object().unwrap();

        assert!(!object.contains_key("exception"));
        assert!(!object.contains_key("traceback"));
        assert!(!object.contains_key("extra"));
    }

    #[test]
    fn test_serialize_with_exception() {
        let mut record = sample_record();
        record.level = Severity::Named(Level::ERROR);
        record.exception = Some(ExceptionInfo::new("ValueError", "bad input"));

        let data = parse(&record);
        assert_eq!(data["level"], "ERROR");
        assert_eq!(data["exception"], "ValueError: bad input");
        assert!(data.get("traceback").is_none());
    }

    #[test]
    fn test_serialize_with_extra() {
        let mut record = sample_record();
        record.extra.insert("user_id".to_string(), Value::from(123));

        let data = parse(&record);
        assert_eq!(data["extra"]["user_id"], 123);
    }

    #[test]
    fn test_numeric_level_name() {
        let mut record = sample_record();
        record.level = Severity::Numeric(25);
        assert_eq!(parse(&record)["level"], "Level 25");
    }

    #[test]
    fn test_fractional_timestamp() {
        let mut record = sample_record();
        record.time = Utc.timestamp_opt(1609459200, 250_000_000).unwrap();
        assert_eq!(record.timestamp(), 1609459200.25);
    }

    #[derive(Debug)]
    struct ConfigMissing {
        source: std::num::ParseIntError,
    }

    impl std::fmt::Display for ConfigMissing {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "port is not configured")
        }
    }

    impl Error for ConfigMissing {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.source)
        }
    }

    #[test]
    fn test_exception_from_error_chain() {
        let err = ConfigMissing {
            source: "x".parse::<u16>().unwrap_err(),
        };
        let info = ExceptionInfo::from_error(&err);

        assert_eq!(info.kind, "Error");
        assert_eq!(info.value, "port is not configured");
        assert_eq!(info.traceback, vec!["invalid digit found in string".to_string()]);

        let mut record = sample_record();
        record.exception = Some(info);
        let data = parse(&record);
        assert_eq!(data["exception"], "Error: port is not configured");
        assert_eq!(data["traceback"][0], "invalid digit found in string");
    }

    #[test]
    fn test_error_kind_names_known_types() {
        let custom = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(ExceptionInfo::from_error(&custom).summary(), "IoError: boom");

        let os = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(error_kind(&os), "IoError");

        let integrity = crate::error::DbError::DataIntegrity {
            column: "id".to_string(),
            reason: "x".to_string(),
        };
        assert_eq!(
            ExceptionInfo::from_error(&integrity).summary(),
            "DbError: data integrity error in column 'id': x"
        );

        let parse = "x".parse::<u16>().unwrap_err();
        assert_eq!(error_kind(&parse), "ParseIntError");
    }

    #[test]
    fn test_coerce_non_finite() {
        assert_eq!(coerce_f64(f64::NAN), Value::String("NaN".to_string()));
        assert_eq!(coerce_f64(1.5), Value::from(1.5));
    }
}
