//! `log` facade adapter
//!
//! Third-party crates log through the `log` facade. [`LogAdapter`] receives
//! those records, finds the code that actually made the call and re-emits
//! them as tracing events, so they share the structured layer and the sinks
//! with everything else.

use std::sync::Arc;

use log::kv::{self, Key, VisitSource};
use serde_json::{Map, Value};
use tracing::{Dispatch, Level};

use super::callsite::{CallSite, CallSiteResolver};
use super::level;
use super::record::ExceptionInfo;

pub(crate) const MODULE: &str = module_path!();

/// Target of tracing events that carry a forwarded `log` record
pub const FORWARD_TARGET: &str = "log";

/// Routes `log` records into a tracing dispatcher
pub struct LogAdapter {
    dispatch: Dispatch,
    resolver: Arc<CallSiteResolver>,
    max_level: log::LevelFilter,
}

impl LogAdapter {
    pub fn new(dispatch: Dispatch, resolver: Arc<CallSiteResolver>, max_level: log::LevelFilter) -> Self {
        Self {
            dispatch,
            resolver,
            max_level,
        }
    }

    pub fn max_level(&self) -> log::LevelFilter {
        self.max_level
    }
}

impl log::Log for LogAdapter {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let forwarded = ForwardedRecord::translate(record, &self.resolver);
        tracing::dispatcher::with_default(&self.dispatch, || forwarded.emit());
    }

    fn flush(&self) {}
}

/// A `log` record translated for the structured logger
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedRecord {
    pub level: Level,
    pub level_name: &'static str,
    pub levelno: u32,
    pub target: String,
    pub message: String,
    pub site: CallSite,
    pub exception: Option<ExceptionInfo>,
    pub extra: Map<String, Value>,
}

impl ForwardedRecord {
    pub fn translate(record: &log::Record<'_>, resolver: &CallSiteResolver) -> Self {
        let level_name = record.level().as_str();
        let levelno = record.level() as u32;

        let fallback = CallSite::from_metadata(record.file(), record.line());
        let site = resolver.resolve(fallback).into_call_site();

        let mut kvs = KeyValues::default();
        // A failing visitor only loses the remaining pairs
        let _ = record.key_values().visit(&mut kvs);

        Self {
            level: level::resolve(level_name, levelno).as_level(),
            level_name,
            levelno,
            target: record.target().to_string(),
            message: record.args().to_string(),
            site,
            exception: kvs.exception,
            extra: kvs.extra,
        }
    }

    /// Emit on the current dispatcher
    pub fn emit(&self) {
        let extra = (!self.extra.is_empty()).then(|| Value::Object(self.extra.clone()).to_string());
        let exception = self.exception.as_ref();
        let kind = exception.map(|e| e.kind.as_str());
        let value = exception.map(|e| e.value.as_str());
        let traceback = exception
            .filter(|e| !e.traceback.is_empty())
            .map(|e| e.traceback.join("\n"));

        let target = self.target.as_str();
        let level_name = self.level_name;
        let levelno = u64::from(self.levelno);
        let function = self.site.function.as_str();
        let file = self.site.file.as_str();
        let line = u64::from(self.site.line);
        let message = self.message.as_str();

        macro_rules! forward {
            ($lvl:expr) => {
                tracing::event!(
                    target: FORWARD_TARGET,
                    $lvl,
                    log.target = target,
                    log.level = level_name,
                    log.levelno = levelno,
                    log.function = function,
                    log.file = file,
                    log.line = line,
                    log.extra = extra.as_deref(),
                    exception.kind = kind,
                    exception.value = value,
                    exception.traceback = traceback.as_deref(),
                    "{}",
                    message
                )
            };
        }

        match self.level {
            Level::ERROR => forward!(Level::ERROR),
            Level::WARN => forward!(Level::WARN),
            Level::INFO => forward!(Level::INFO),
            Level::DEBUG => forward!(Level::DEBUG),
            Level::TRACE => forward!(Level::TRACE),
        }
    }
}

/// Splits record key/values into an exception and contextual extras
#[derive(Default)]
struct KeyValues {
    exception: Option<ExceptionInfo>,
    extra: Map<String, Value>,
}

impl<'kvs> VisitSource<'kvs> for KeyValues {
    fn visit_pair(&mut self, key: Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let key = key.as_str();

        if matches!(key, "error" | "exception") && self.exception.is_none() {
            if let Some(err) = value.to_borrowed_error() {
                self.exception = Some(ExceptionInfo::from_error(err));
                return Ok(());
            }
        }

        let json = serde_json::to_value(&value).unwrap_or_else(|_| Value::String(value.to_string()));
        self.extra.insert(key.to_string(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::callsite::{Frame, ModuleSkip};
    use crate::logging::layer::StructuredLayer;
    use crate::logging::sink::{ConsoleSink, MemoryWriter, Sink};
    use log::Log;
    use tracing_subscriber::layer::SubscriberExt;

    fn frames_through_adapter(depth: usize) -> Vec<Frame> {
        let mut frames = vec![
            Frame::new(format!("{}::ForwardedRecord::translate", MODULE)),
            Frame::new(format!("<{}::LogAdapter as log::Log>::log", MODULE)),
        ];
        frames.extend((0..depth).map(|i| Frame::new(format!("log::__private_api::layer{}", i))));
        frames.push(Frame::new("shop::checkout::place_order").at("src/checkout.rs", 77));
        frames
    }

    fn setup(frames: Vec<Frame>) -> (MemoryWriter, LogAdapter, Dispatch) {
        let writer = MemoryWriter::new();
        let resolver = Arc::new(CallSiteResolver::new(frames, ModuleSkip::logging_internals()));
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(ConsoleSink::with_writer(writer.clone()))];
        let layer = StructuredLayer::new(resolver.clone(), sinks);
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(layer));
        let adapter = LogAdapter::new(dispatch.clone(), resolver, log::LevelFilter::Trace);
        (writer, adapter, dispatch)
    }

    #[test]
    fn test_forwarded_record_is_attributed_to_caller() {
        for depth in [0, 3] {
            let (writer, adapter, _) = setup(frames_through_adapter(depth));

            adapter.log(
                &log::Record::builder()
                    .args(format_args!("order {} placed", 17))
                    .level(log::Level::Info)
                    .target("shop::checkout")
                    .file(Some("/registry/log/src/macros.rs"))
                    .line(Some(3))
                    .build(),
            );

            let data = &writer.json_lines()[0];
            assert_eq!(data["message"], "order 17 placed");
            assert_eq!(data["level"], "INFO");
            assert_eq!(data["name"], "shop::checkout");
            assert_eq!(data["function"], "place_order");
            assert_eq!(data["path"], "src/checkout.rs");
            assert_eq!(data["line"], 77);
        }
    }

    #[test]
    fn test_forwarded_record_degrades_without_caller() {
        let (writer, adapter, _) = setup(vec![Frame::new("log::__private_api::log_impl")]);

        adapter.log(
            &log::Record::builder()
                .args(format_args!("no caller"))
                .level(log::Level::Warn)
                .target("lib")
                .file(Some("src/lib.rs"))
                .line(Some(12))
                .build(),
        );

        let data = &writer.json_lines()[0];
        assert_eq!(data["level"], "WARN");
        assert_eq!(data["function"], "unknown");
        assert_eq!(data["path"], "src/lib.rs");
        assert_eq!(data["line"], 12);
    }

    #[test]
    fn test_log_and_tracing_produce_same_record_shape() {
        let (writer, adapter, dispatch) = setup(frames_through_adapter(1));

        adapter.log(
            &log::Record::builder()
                .args(format_args!("cache warmed"))
                .level(log::Level::Info)
                .target("cache")
                .build(),
        );
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "cache", "cache warmed");
        });

        let lines = writer.json_lines();
        assert_eq!(lines.len(), 2);
        for key in ["level", "message", "name"] {
            assert_eq!(lines[0][key], lines[1][key], "{key} differs");
        }
    }

    #[test]
    fn test_key_values_split_into_exception_and_extra() {
        let (writer, adapter, _) = setup(frames_through_adapter(0));
        let err = "12x".parse::<u8>().unwrap_err();
        let kvs = [
            ("error", kv::Value::from_dyn_error(&err)),
            ("user_id", kv::Value::from(123u64)),
            ("region", kv::Value::from("eu")),
        ];

        adapter.log(
            &log::Record::builder()
                .args(format_args!("checkout failed"))
                .level(log::Level::Error)
                .target("shop")
                .key_values(&kvs)
                .build(),
        );

        let data = &writer.json_lines()[0];
        assert_eq!(data["level"], "ERROR");
        assert_eq!(data["exception"], "ParseIntError: invalid digit found in string");
        assert_eq!(data["extra"]["user_id"], 123);
        assert_eq!(data["extra"]["region"], "eu");
        assert!(data["extra"].get("error").is_none());
    }

    #[test]
    fn test_adapter_respects_max_level() {
        let writer = MemoryWriter::new();
        let resolver = Arc::new(CallSiteResolver::new(frames_through_adapter(0), ModuleSkip::logging_internals()));
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(ConsoleSink::with_writer(writer.clone()))];
        let dispatch = Dispatch::new(
            tracing_subscriber::registry().with(StructuredLayer::new(resolver.clone(), sinks)),
        );
        let adapter = LogAdapter::new(dispatch, resolver, log::LevelFilter::Warn);

        adapter.log(
            &log::Record::builder()
                .args(format_args!("chatty"))
                .level(log::Level::Debug)
                .target("noisy")
                .build(),
        );

        assert!(writer.lines().is_empty());
        assert!(!adapter.enabled(&log::Metadata::builder().level(log::Level::Info).build()));
    }
}
