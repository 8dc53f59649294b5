pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod ulid;

use crate::config::LoggingConfig;
use crate::error::LoggingError;
use crate::logging::LoggingContext;

pub use crate::ulid::Ulid;

/// Build the logging context and install it process-wide
///
/// Can only succeed once per process. If a subscriber or `log` logger is
/// already installed, the context is still returned so callers can keep
/// using it through [`LoggingContext::in_scope`].
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingContext, LoggingError> {
    let context = LoggingContext::new(config)?;

    if let Err(e) = context.install() {
        eprintln!("Warning: Failed to install structured logging: {}", e);
        eprintln!("Records will only reach this context when used explicitly");
    }

    Ok(context)
}
