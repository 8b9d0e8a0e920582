//! Structured logging setup.
//!
//! The router itself only emits `tracing` events; installing a subscriber is
//! the application's call. [`init_tracing`] is a ready-made one: an
//! `EnvFilter` plus a JSON or pretty `fmt` layer.
//!
//! | Variable                   | Default | Meaning                                  |
//! |----------------------------|---------|------------------------------------------|
//! | `NIMBUS_LOG_LEVEL`         | `info`  | trace / debug / info / warn / error      |
//! | `NIMBUS_LOG_FORMAT`        | `json`  | `json` or `pretty`                       |
//! | `NIMBUS_LOG_TARGET_FILTER` | unset   | extra comma-separated filter directives  |
//! | `NIMBUS_LOG_LOCATION`      | `false` | include file and line in each event      |
//!
//! `RUST_LOG`, when set, takes precedence over `NIMBUS_LOG_LEVEL`.

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Read `NIMBUS_LOG_*` variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: get("NIMBUS_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: get("NIMBUS_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.format),
            target_filter: get("NIMBUS_LOG_TARGET_FILTER").filter(|s| !s.trim().is_empty()),
            include_location: get("NIMBUS_LOG_LOCATION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.include_location),
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                let parsed = directive
                    .parse()
                    .with_context(|| format!("invalid log filter directive {directive:?}"))?;
                filter = filter.add_directive(parsed);
            }
        }
        Ok(filter)
    }
}

/// Install a global subscriber according to `config`.
///
/// Returns an error if a filter directive is malformed or a global subscriber
/// is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}
