//! Logging setup for dependency-validator
//!
//! Validation emits `tracing` events under the `dependency_validator`
//! target: container builds and validation summaries at DEBUG, per
//! registration decisions and call-graph walks at TRACE.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - JSON subscriber output
//! - `logging-pretty` - Human-readable subscriber output
//!
//! # Example
//!
//! ```rust,ignore
//! use dependency_validator::logging;
//!
//! // JSON if logging-json is enabled, pretty otherwise
//! logging::init();
//!
//! // Only this crate's events, one line each
//! logging::builder()
//!     .trace()
//!     .compact()
//!     .validator_only()
//!     .init();
//! ```

use tracing::Level;

/// Target every event of this crate is emitted under.
pub const TARGET: &str = "dependency_validator";

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line colorful output
    Pretty,
    /// Single-line output
    Compact,
}

/// Builder for the global subscriber
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: if cfg!(feature = "logging-json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            target: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Per-registration and walker events
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Build and validation summaries
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only show events from `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show dependency-validator events
    pub fn validator_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// `EnvFilter` directive for the configured level and target.
    pub fn filter_directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the subscriber globally.
    ///
    /// Does nothing if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::new(self.filter_directive());
        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_target(true);
        let registry = tracing_subscriber::registry().with(filter);

        let _ = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact()).try_init(),
        };
    }

    /// No subscriber backend compiled in.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Create a new logging builder
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install a DEBUG subscriber in the default format.
pub fn init() {
    builder().init();
}

/// Install a JSON subscriber.
pub fn init_json() {
    builder().json().init();
}

/// Install a pretty subscriber.
pub fn init_pretty() {
    builder().pretty().init();
}

/// Install a TRACE subscriber showing only this crate's events.
pub fn init_validator_only() {
    builder().trace().validator_only().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert!(builder.target.is_none());
        assert_eq!(builder.filter_directive(), "debug");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .compact()
            .with_file()
            .with_line_number()
            .validator_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.with_file);
        assert!(builder.with_line_number);
        assert_eq!(builder.filter_directive(), "dependency_validator=trace");
    }
}
