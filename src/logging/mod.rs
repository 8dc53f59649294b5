//! Structured logging bridge
//!
//! Application code logs through `tracing`; dependencies log through the
//! `log` facade. Both end up in one [`StructuredLayer`] that renders JSON
//! records with the real call site and hands them to the configured sinks.
//!
//! ```ignore
//! let logging = LoggingContext::new(&settings.logging)?;
//! logging.install()?;
//! log::info!("from a dependency");
//! tracing::info!(user_id = 7, "from the application");
//! ```

pub mod bridge;
pub mod callsite;
pub mod layer;
pub mod level;
pub mod record;
#[cfg(feature = "remote-sink")]
pub mod remote;
pub mod sink;

use std::sync::Arc;

use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::{LoggingConfig, RemoteConfig};
use crate::error::LoggingError;

pub use bridge::LogAdapter;
pub use callsite::{Attribution, CallSite, CallSiteResolver, Frame, FrameSource, ModuleSkip, SkipPredicate};
pub use layer::StructuredLayer;
pub use level::Severity;
pub use record::{serialize, ExceptionInfo, LogRecord};
#[cfg(feature = "remote-sink")]
pub use remote::RemoteSink;
pub use sink::{ConsoleSink, MemoryWriter, Sink};

/// Logging state for the whole process, built once at startup
pub struct LoggingContext {
    dispatch: Dispatch,
    resolver: Arc<CallSiteResolver>,
    threshold: LevelFilter,
    sink_names: Vec<&'static str>,
    remote: Option<RemoteHandle>,
}

impl LoggingContext {
    /// Console on stdout plus the remote sink when configured
    pub fn new(config: &LoggingConfig) -> Result<Self, LoggingError> {
        Self::builder(config).build()
    }

    pub fn builder(config: &LoggingConfig) -> LoggingContextBuilder {
        LoggingContextBuilder {
            config: config.clone(),
            console: None,
            resolver: None,
            sinks: Vec::new(),
        }
    }

    /// Make this context the process-wide logger for both `tracing` and `log`.
    ///
    /// Fails if another subscriber or `log` logger is already installed.
    pub fn install(&self) -> Result<(), LoggingError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())?;
        log::set_boxed_logger(Box::new(self.adapter()))?;
        log::set_max_level(level::to_log_filter(self.threshold));
        Ok(())
    }

    /// Run `f` with this context as the current dispatcher, without
    /// touching global state
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// A `log::Log` implementation feeding this context
    pub fn adapter(&self) -> LogAdapter {
        LogAdapter::new(
            self.dispatch.clone(),
            self.resolver.clone(),
            level::to_log_filter(self.threshold),
        )
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn threshold(&self) -> LevelFilter {
        self.threshold
    }

    /// Ship whatever the remote sink still has queued. Call before the
    /// runtime shuts down.
    pub async fn flush(&self) {
        if let Some(remote) = &self.remote {
            remote.flush().await;
        }
    }

    /// Names of the registered sinks, console first
    pub fn sink_names(&self) -> &[&'static str] {
        &self.sink_names
    }
}

pub struct LoggingContextBuilder {
    config: LoggingConfig,
    console: Option<Arc<dyn Sink>>,
    resolver: Option<CallSiteResolver>,
    sinks: Vec<Arc<dyn Sink>>,
}

impl LoggingContextBuilder {
    /// Send console output somewhere other than stdout
    pub fn console_writer<W>(mut self, make_writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.console = Some(Arc::new(ConsoleSink::with_writer(make_writer)));
        self
    }

    pub fn resolver(mut self, resolver: CallSiteResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register an additional sink after the built-in ones
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<LoggingContext, LoggingError> {
        let threshold = level::parse_threshold(&self.config.level)?;
        let resolver = Arc::new(
            self.resolver
                .unwrap_or_else(|| CallSiteResolver::from_config(&self.config.attribution)),
        );

        let mut sinks: Vec<Arc<dyn Sink>> = vec![self
            .console
            .unwrap_or_else(|| Arc::new(ConsoleSink::stdout()))];

        let mut unavailable = None;
        let mut remote = None;
        if self.config.remote.is_active() {
            match remote_sink(&self.config.remote) {
                Ok(sink) => {
                    sinks.push(Arc::new(sink.clone()));
                    remote = Some(sink);
                }
                Err(e) => unavailable = Some(e),
            }
        }
        sinks.extend(self.sinks);

        let sink_names = sinks.iter().map(|s| s.name()).collect();

        // The threshold stays the catch-all; directives only refine named targets
        let directives = match self.config.directives.as_deref() {
            Some(extra) if !extra.trim().is_empty() => format!("{},{}", threshold, extra),
            _ => threshold.to_string(),
        };
        let filter = EnvFilter::builder().parse_lossy(directives);
        let layer = StructuredLayer::new(resolver.clone(), sinks).with_traceback(self.config.backtrace);
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(filter).with(layer));

        if let Some(e) = unavailable {
            tracing::dispatcher::with_default(&dispatch, || {
                tracing::warn!(error = %e, "Remote log shipping unavailable, logging to console only");
            });
        }

        Ok(LoggingContext {
            dispatch,
            resolver,
            threshold,
            sink_names,
            remote,
        })
    }
}

#[cfg(feature = "remote-sink")]
type RemoteHandle = remote::RemoteSink;

#[cfg(feature = "remote-sink")]
fn remote_sink(config: &RemoteConfig) -> Result<RemoteHandle, LoggingError> {
    remote::RemoteSink::spawn(config)
}

/// Stand-in when shipping is compiled out; never constructed
#[cfg(not(feature = "remote-sink"))]
#[derive(Clone)]
enum RemoteHandle {}

#[cfg(not(feature = "remote-sink"))]
impl RemoteHandle {
    async fn flush(&self) {
        match *self {}
    }
}

#[cfg(not(feature = "remote-sink"))]
impl Sink for RemoteHandle {
    fn name(&self) -> &'static str {
        match *self {}
    }

    fn write(&self, _record: &LogRecord, _line: &str) {
        match *self {}
    }
}

#[cfg(not(feature = "remote-sink"))]
fn remote_sink(_config: &RemoteConfig) -> Result<RemoteHandle, LoggingError> {
    Err(LoggingError::OptionalSinkUnavailable(
        "built without the remote-sink feature".to_string(),
    ))
}
