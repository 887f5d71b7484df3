//! Log subscriber setup for fountain binaries.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the process that hosts them. `fountainctl` uses
//! [`TracingConfig::cli`], a long-running bridge would use
//! [`TracingConfig::bridge`]:
//!
//! ```ignore
//! use fountain_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::bridge())?;
//! ```
//!
//! Output goes to stderr so it never mixes with decoded frames on stdout.

use std::io;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::{
    self,
    format::{DefaultFields, FmtSpan, Format},
};
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for reading by eye.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for TracingOutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown log format {other:?} (expected pretty, compact or json)"
            )),
        }
    }
}

impl std::fmt::Display for TracingOutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// How to install the global subscriber.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the `fountain_*` crates when neither `RUST_LOG` nor
    /// `env_filter` is set.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Source file and line on every event.
    pub include_location: bool,
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Log span open/close; the engine opens one span per session.
    pub include_span_events: bool,
    /// Filter directive that takes precedence over `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_target: true,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Quiet one-line output for interactive commands: warnings only.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            default_level: Level::WARN,
            output_format: TracingOutputFormat::Compact,
            include_target: false,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// `cli()` at debug level with source locations.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_target: true,
            ..Self::cli()
        }
    }

    /// JSON with span events, for a process that keeps a fountain
    /// connected for days and ships its logs elsewhere.
    #[must_use]
    pub fn bridge() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Directive used when nothing overrides it. The `fountain` target
    /// prefix covers every crate in the workspace.
    pub fn default_directive(&self) -> String {
        format!("fountain={}", self.default_level)
    }

    /// Resolves the filter: explicit directive, then `RUST_LOG`, then the
    /// default directive.
    pub fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.env_filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn base_layer(&self) -> fmt::Layer<Registry, DefaultFields, Format, fn() -> io::Stderr> {
        fmt::layer()
            .with_writer(io::stderr as fn() -> io::Stderr)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_target(self.include_target)
            .with_span_events(self.span_events())
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = self.base_layer();
        match (self.output_format, self.include_timestamp) {
            (TracingOutputFormat::Pretty, true) => base.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => base.compact().boxed(),
            (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
            (TracingOutputFormat::Json, true) => base.json().boxed(),
            (TracingOutputFormat::Json, false) => base.json().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter directive does
/// not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let subscriber = tracing_subscriber::registry().with(config.fmt_layer().with_filter(filter));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
