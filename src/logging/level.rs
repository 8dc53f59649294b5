//! Severity names and thresholds shared by both logging paths.

use std::borrow::Cow;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;

use crate::error::LoggingError;

/// Severity of a structured record
///
/// Conventional level names map onto tracing levels. Anything else keeps its
/// raw number and renders as `Level <n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Named(Level),
    Numeric(u32),
}

impl Severity {
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::Named(level) => Cow::Borrowed(level_name(level)),
            Self::Numeric(n) => Cow::Owned(format!("Level {}", n)),
        }
    }

    /// Nearest tracing level, used for thresholds and event emission
    pub fn as_level(&self) -> Level {
        match self {
            Self::Named(level) => *level,
            Self::Numeric(n) => numeric_to_level(*n),
        }
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        Self::Named(level)
    }
}

pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

/// Case-insensitive lookup of a conventional level name
pub fn lookup(name: &str) -> Option<Level> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "CRITICAL" | "FATAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// Map a conventional level name, falling back to the raw numeric severity
pub fn resolve(name: &str, numeric: u32) -> Severity {
    lookup(name).map(Severity::Named).unwrap_or(Severity::Numeric(numeric))
}

/// `log` crate numbering: 1 = ERROR .. 5 = TRACE
pub fn numeric_to_level(n: u32) -> Level {
    match n {
        0 | 1 => Level::ERROR,
        2 => Level::WARN,
        3 => Level::INFO,
        4 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Parse the configured minimum severity (`"INFO"`, `"warning"`, `"off"`, ...)
pub fn parse_threshold(value: &str) -> Result<LevelFilter, LoggingError> {
    if value.trim().eq_ignore_ascii_case("off") {
        return Ok(LevelFilter::OFF);
    }
    lookup(value)
        .map(LevelFilter::from_level)
        .ok_or_else(|| LoggingError::InvalidLevel(value.to_string()))
}

pub fn to_log_filter(filter: LevelFilter) -> log::LevelFilter {
    match filter.into_level() {
        None => log::LevelFilter::Off,
        Some(Level::ERROR) => log::LevelFilter::Error,
        Some(Level::WARN) => log::LevelFilter::Warn,
        Some(Level::INFO) => log::LevelFilter::Info,
        Some(Level::DEBUG) => log::LevelFilter::Debug,
        Some(Level::TRACE) => log::LevelFilter::Trace,
    }
}
