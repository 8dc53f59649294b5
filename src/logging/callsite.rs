//! Call-site attribution by walking the stack
//!
//! A log call reaches us through an unknown number of frames that belong to
//! the logging machinery (`log` macros, tracing dispatch, our adapter and
//! layer). Instead of skipping a fixed number of frames, the walk asks a
//! [`SkipPredicate`] about each frame and stops at the first one it does not
//! claim. If the stack runs out first, attribution degrades to the metadata
//! the record already carries.

use std::borrow::Cow;
use std::sync::Arc;

use crate::config::AttributionConfig;

pub(crate) const MODULE: &str = module_path!();

/// Placeholder for a function name that could not be determined
pub const UNKNOWN_FUNCTION: &str = "unknown";

/// A resolved stack frame. Any part may be missing when symbols or debug
/// info are unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl Frame {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// Decides whether a frame belongs to the logging implementation
pub trait SkipPredicate: Send + Sync {
    fn skip(&self, frame: &Frame) -> bool;
}

impl<F> SkipPredicate for F
where
    F: Fn(&Frame) -> bool + Send + Sync,
{
    fn skip(&self, frame: &Frame) -> bool {
        self(frame)
    }
}

/// Skips frames whose function lives in one of a set of module paths.
///
/// Frames without a symbol name, and foreign symbols without a module path
/// (`_Unwind_Backtrace`, `__libc_start_main`), are skipped as well.
#[derive(Debug, Clone, Default)]
pub struct ModuleSkip {
    modules: Vec<Cow<'static, str>>,
}

impl ModuleSkip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crates and modules that sit between a log call and the sinks
    pub fn logging_internals() -> Self {
        [
            "backtrace",
            "log",
            "tracing",
            "tracing_core",
            "tracing_subscriber",
            "tracing_log",
            "std",
            "core",
            "alloc",
            MODULE,
            super::bridge::MODULE,
            super::layer::MODULE,
        ]
        .into_iter()
        .fold(Self::new(), Self::with_module)
    }

    pub fn with_module(mut self, module: impl Into<Cow<'static, str>>) -> Self {
        self.modules.push(module.into());
        self
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.as_ref())
    }
}

impl SkipPredicate for ModuleSkip {
    fn skip(&self, frame: &Frame) -> bool {
        match frame.function.as_deref() {
            None => true,
            Some(function) if !function.contains("::") => true,
            Some(function) => self.modules.iter().any(|m| in_module(function, m)),
        }
    }
}

/// `function` is a symbol path such as `app::orders::create` or
/// `<app::Adapter as log::Log>::log`; the latter belongs to `app`.
pub fn in_module(function: &str, module: &str) -> bool {
    owner_path(function)
        .strip_prefix(module)
        .is_some_and(|rest| rest.starts_with("::") || rest.starts_with('<'))
}

/// Path that decides which module a trait-method symbol belongs to: the
/// implementing type, or the trait when the type is a bare generic
/// (`<&mut F as core::ops::FnMut<A>>::call_mut` belongs to `core`).
fn owner_path(function: &str) -> &str {
    let Some(qualified) = function.strip_prefix('<') else {
        return function;
    };
    let self_ty = qualified
        .trim_start_matches('&')
        .trim_start_matches("mut ")
        .trim_start_matches("dyn ");

    match self_ty.split_once(" as ") {
        Some((ty, trait_path)) if !ty.contains("::") => trait_path,
        _ => self_ty,
    }
}

/// Produces frames, innermost first
pub trait FrameSource: Send + Sync {
    /// Feed frames to `visit` until it returns `false` or the stack ends
    fn visit(&self, visit: &mut dyn FnMut(Frame) -> bool);
}

/// Live stack via the `backtrace` crate. Symbols are resolved one frame at a
/// time so the walk only pays for the frames it inspects.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceSource;

impl FrameSource for BacktraceSource {
    fn visit(&self, visit: &mut dyn FnMut(Frame) -> bool) {
        let mut keep_going = true;
        backtrace::trace(|raw| {
            backtrace::resolve_frame(raw, |symbol| {
                if !keep_going {
                    return;
                }
                let frame = Frame {
                    // `{:#}` drops the trailing hash
                    function: symbol.name().map(|name| format!("{:#}", name)),
                    file: symbol.filename().map(|path| path.display().to_string()),
                    line: symbol.lineno(),
                };
                keep_going = visit(frame);
            });
            keep_going
        });
    }
}

/// Fixed frame list, innermost first
impl FrameSource for Vec<Frame> {
    fn visit(&self, visit: &mut dyn FnMut(Frame) -> bool) {
        for frame in self {
            if !visit(frame.clone()) {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl CallSite {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
        }
    }

    /// Site built from record metadata alone
    pub fn from_metadata(file: Option<&str>, line: Option<u32>) -> Self {
        Self::new(UNKNOWN_FUNCTION, file.unwrap_or("unknown"), line.unwrap_or(0))
    }
}

/// Outcome of call-site resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// Caller frame found with full location
    Walked(CallSite),
    /// Stack walk turned off; metadata used as-is
    Metadata(CallSite),
    /// Walk exhausted or incomplete; best available site
    Degraded(CallSite),
}

impl Attribution {
    pub fn call_site(&self) -> &CallSite {
        match self {
            Self::Walked(site) | Self::Metadata(site) | Self::Degraded(site) => site,
        }
    }

    pub fn into_call_site(self) -> CallSite {
        match self {
            Self::Walked(site) | Self::Metadata(site) | Self::Degraded(site) => site,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Finds the first frame outside the logging machinery
pub struct CallSiteResolver {
    source: Box<dyn FrameSource>,
    skip: Arc<dyn SkipPredicate>,
    max_depth: usize,
    enabled: bool,
}

impl CallSiteResolver {
    pub fn new(source: impl FrameSource + 'static, skip: impl SkipPredicate + 'static) -> Self {
        Self {
            source: Box::new(source),
            skip: Arc::new(skip),
            max_depth: 64,
            enabled: true,
        }
    }

    /// Live stack with the default skip list
    pub fn live() -> Self {
        Self::new(BacktraceSource, ModuleSkip::logging_internals())
    }

    /// Never walks; every record keeps its own metadata
    pub fn disabled() -> Self {
        let mut resolver = Self::live();
        resolver.enabled = false;
        resolver
    }

    pub fn from_config(config: &AttributionConfig) -> Self {
        let mut resolver = if config.walk_stack {
            Self::live()
        } else {
            Self::disabled()
        };
        resolver.max_depth = config.max_depth;
        resolver
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// First frame the skip predicate does not claim, within `max_depth`
    pub fn first_caller(&self) -> Option<Frame> {
        let mut found = None;
        let mut depth = 0;
        self.source.visit(&mut |frame| {
            depth += 1;
            if depth > self.max_depth {
                return false;
            }
            if self.skip.skip(&frame) {
                return true;
            }
            found = Some(frame);
            false
        });
        found
    }

    /// Resolve the caller, falling back to `metadata` for whatever the walk
    /// cannot provide.
    pub fn resolve(&self, metadata: CallSite) -> Attribution {
        if !self.enabled {
            return Attribution::Metadata(metadata);
        }

        match self.first_caller() {
            Some(Frame {
                function,
                file: Some(file),
                line: Some(line),
            }) => Attribution::Walked(CallSite {
                function: short_function_name(function.as_deref()),
                file,
                line,
            }),
            Some(frame) => Attribution::Degraded(CallSite {
                function: short_function_name(frame.function.as_deref()),
                ..metadata
            }),
            None => Attribution::Degraded(metadata),
        }
    }
}

impl std::fmt::Debug for CallSiteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSiteResolver")
            .field("max_depth", &self.max_depth)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Last path segment of a symbol, ignoring closure frames:
/// `<app::Handler as Service>::call::{{closure}}` -> `call`
pub fn short_function_name(path: Option<&str>) -> String {
    let Some(mut path) = path else {
        return UNKNOWN_FUNCTION.to_string();
    };
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    match path.rsplit("::").next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_FUNCTION.to_string(),
    }
}
