use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Why a string was rejected as an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatViolation {
    /// Input is not exactly 26 characters long
    Length(usize),
    /// Character outside the Crockford base-32 alphabet
    Character { ch: char, index: usize },
    /// Leading character encodes more than 128 bits
    Overflow,
}

/// Decoding failure for a textual identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier format: {violation}")]
pub struct InvalidIdentifierFormat {
    pub violation: FormatViolation,
}

impl InvalidIdentifierFormat {
    pub fn new(violation: FormatViolation) -> Self {
        Self { violation }
    }
}

impl fmt::Display for FormatViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(len) => write!(f, "expected 26 characters, got {}", len),
            Self::Character { ch, index } => {
                write!(f, "character {:?} at position {} is not in the alphabet", ch, index)
            }
            Self::Overflow => write!(f, "value exceeds 128 bits"),
        }
    }
}

/// Logging setup errors
///
/// Only configuration parsing and global installation can fail. Emitting a
/// record never returns an error.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("optional sink unavailable: {0}")]
    OptionalSinkUnavailable(String),

    #[error("failed to install log adapter: {0}")]
    SetLogger(#[from] log::SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back into its domain type
    #[error("data integrity error in column '{column}': {reason}")]
    DataIntegrity { column: String, reason: String },
}

impl DbError {
    /// Reclassify column decode failures as data-integrity errors
    pub fn from_row_error(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { index, source } => Self::DataIntegrity {
                column: index.trim_matches('"').to_string(),
                reason: source.to_string(),
            },
            other => Self::Sqlx(other),
        }
    }
}

/// Errors returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The database did not answer a health probe
    #[error("Database unavailable: {0}")]
    DatabaseOffline(#[from] DbError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::DatabaseOffline(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "is_db_online": false,
                    "error": {
                        "message": self.to_string(),
                        "type": error_type_name(&self),
                    }
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::DatabaseOffline(DbError::DataIntegrity { .. }) => "data_integrity_error",
        AppError::DatabaseOffline(_) => "database_error",
    }
}
