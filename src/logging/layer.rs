//! Tracing layer that renders every event as a structured record
//!
//! Two kinds of events arrive here:
//! - direct `tracing` events from application code, attributed by walking
//!   the stack from this layer outward;
//! - events forwarded by the `log` adapter, which carry the original record
//!   under `log.*` fields with the call site already resolved.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use super::bridge::FORWARD_TARGET;
use super::callsite::{CallSite, CallSiteResolver};
use super::level::{self, Severity};
use super::record::{self, ExceptionInfo, LogRecord};
use super::sink::Sink;

pub(crate) const MODULE: &str = module_path!();

/// Renders events to JSON and hands them to every sink
pub struct StructuredLayer {
    resolver: Arc<CallSiteResolver>,
    sinks: Vec<Arc<dyn Sink>>,
    include_traceback: bool,
}

impl StructuredLayer {
    pub fn new(resolver: Arc<CallSiteResolver>, sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self {
            resolver,
            sinks,
            include_traceback: true,
        }
    }

    pub fn with_traceback(mut self, include: bool) -> Self {
        self.include_traceback = include;
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    fn dispatch(&self, record: &LogRecord) {
        let line = record::serialize(record);
        for sink in &self.sinks {
            if sink.accepts(record) {
                sink.write(record, &line);
            }
        }
    }

    fn build_record<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> LogRecord
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let metadata = event.metadata();

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut extra = span_fields(event, ctx);

        let mut record = match visitor.forwarded.take() {
            Some(forwarded) if metadata.target() == FORWARD_TARGET => {
                let severity = level::resolve(&forwarded.level, forwarded.levelno);
                let site = CallSite::new(forwarded.function, forwarded.file, forwarded.line);
                extra.extend(forwarded.extra);
                LogRecord::new(severity, visitor.message, forwarded.target).with_call_site(site)
            }
            _ => {
                let fallback = CallSite::from_metadata(metadata.file(), metadata.line());
                let site = self.resolver.resolve(fallback).into_call_site();
                LogRecord::new(Severity::Named(*metadata.level()), visitor.message, metadata.target())
                    .with_call_site(site)
            }
        };

        extra.extend(visitor.fields);
        record.extra = extra;
        record.exception = visitor.exception.take().map(|mut exception| {
            if !self.include_traceback {
                exception.traceback.clear();
            }
            exception
        });
        record
    }
}

impl<S> Layer<S> for StructuredLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = EventVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = EventVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(SpanFields(fields)) => fields.extend(visitor.fields),
            None => extensions.insert(SpanFields(visitor.fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let record = self.build_record(event, &ctx);
        self.dispatch(&record);
    }
}

/// Fields recorded on a span, stored in its extensions
struct SpanFields(Map<String, Value>);

/// Fields of every span enclosing the event, innermost span winning
fn span_fields<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> Map<String, Value>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let mut merged = Map::new();
    if let Some(scope) = ctx.event_scope(event) {
        for span in scope.from_root() {
            if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
    }
    merged
}

/// Original `log` record carried on a forwarded event
#[derive(Default)]
struct Forwarded {
    target: String,
    level: String,
    levelno: u32,
    function: String,
    file: String,
    line: u32,
    extra: Map<String, Value>,
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Map<String, Value>,
    forwarded: Option<Forwarded>,
    exception: Option<ExceptionInfo>,
}

impl EventVisitor {
    fn forwarded(&mut self) -> &mut Forwarded {
        self.forwarded.get_or_insert_with(Forwarded::default)
    }

    fn exception(&mut self) -> &mut ExceptionInfo {
        self.exception
            .get_or_insert_with(|| ExceptionInfo::new("Error", String::new()))
    }

    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = value_text(value),
            "log.target" => self.forwarded().target = value_text(value),
            "log.level" => self.forwarded().level = value_text(value),
            "log.levelno" => self.forwarded().levelno = value.as_u64().unwrap_or(0) as u32,
            "log.function" => self.forwarded().function = value_text(value),
            "log.file" => self.forwarded().file = value_text(value),
            "log.line" => self.forwarded().line = value.as_u64().unwrap_or(0) as u32,
            "log.extra" => {
                if let Ok(Value::Object(extra)) = serde_json::from_str(&value_text(value)) {
                    self.forwarded().extra = extra;
                }
            }
            "exception.kind" => self.exception().kind = value_text(value),
            "exception.value" => self.exception().value = value_text(value),
            "exception.traceback" => {
                self.exception().traceback = value_text(value)
                    .lines()
                    .map(str::to_string)
                    .collect()
            }
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, record::coerce_f64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if self.exception.is_none() {
            self.exception = Some(ExceptionInfo::from_error(value));
        } else {
            self.record_value(field, Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, Value::String(format!("{:?}", value)));
    }
}
