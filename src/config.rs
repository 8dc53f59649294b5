use serde::{Deserialize, Serialize};

use crate::logging::level::parse_threshold;

pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://in.logs.betterstack.com";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:olympus.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity, e.g. "INFO" or "warning"
    pub level: String,
    /// Extra `EnvFilter` directives for tracing targets, e.g. "sqlx=warn"
    pub directives: Option<String>,
    /// Include the error cause chain as `traceback`
    pub backtrace: bool,
    pub attribution: AttributionConfig,
    pub remote: RemoteConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            directives: None,
            backtrace: true,
            attribution: AttributionConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Walk the stack to find the calling function
    pub walk_stack: bool,
    pub max_depth: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            walk_stack: true,
            max_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub token: String,
    pub endpoint: String,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            batch_size: 100,
            flush_interval_ms: 1000,
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// Enabled and holding a token
    pub fn is_active(&self) -> bool {
        self.enabled && !self.token.trim().is_empty()
    }
}

/// Environment variables kept from older deployments
const LEGACY_ENV: &[(&str, &str)] = &[
    ("LOG_LEVEL", "logging.level"),
    ("LOGTAIL_ENABLED", "logging.remote.enabled"),
    ("LOGTAIL_TOKEN", "logging.remote.token"),
    ("DATABASE_URL", "database.url"),
];

/// Load settings from `config.{toml,yaml,json}` (optional) and the environment
///
/// `OLYMPUS__LOGGING__LEVEL=debug` overrides `logging.level`; the legacy
/// variables in [`LEGACY_ENV`] win over both.
pub fn load_config() -> anyhow::Result<Settings> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            config::Environment::with_prefix("OLYMPUS")
                .separator("__")
                .try_parsing(true),
        );
    let builder = apply_legacy_env(builder, |name| std::env::var(name).ok())?;

    settings_from(builder.build()?)
}

fn apply_legacy_env<F>(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
    lookup: F,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in LEGACY_ENV {
        builder = builder.set_override_option(*key, lookup(var))?;
    }
    Ok(builder)
}

fn settings_from(config: config::Config) -> anyhow::Result<Settings> {
    let settings: Settings = config.try_deserialize()?;
    validate_config(&settings)?;
    Ok(settings)
}

pub fn validate_config(cfg: &Settings) -> anyhow::Result<()> {
    parse_threshold(&cfg.logging.level)?;

    if let Some(directives) = &cfg.logging.directives {
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(directives) {
            anyhow::bail!("Invalid logging directives '{}': {}", directives, e);
        }
    }

    if cfg.logging.attribution.max_depth == 0 {
        anyhow::bail!("logging.attribution.max_depth must be greater than zero");
    }

    let remote = &cfg.logging.remote;
    if remote.enabled {
        if remote.batch_size == 0 {
            anyhow::bail!("logging.remote.batch_size must be greater than zero");
        }
        if remote.flush_interval_ms == 0 {
            anyhow::bail!("logging.remote.flush_interval_ms must be greater than zero");
        }
        if !remote.endpoint.starts_with("http://") && !remote.endpoint.starts_with("https://") {
            anyhow::bail!("logging.remote.endpoint must be an http(s) URL: {}", remote.endpoint);
        }
    }

    if cfg.database.url.is_empty() {
        anyhow::bail!("database.url cannot be empty");
    }

    Ok(())
}
