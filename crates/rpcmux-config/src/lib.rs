//! Shared configuration for the rpcmux engine.
//!
//! The engine itself has no configuration file or command-line surface; the
//! embedding application builds an [`EngineConfig`] (directly or by
//! deserialising it from its own configuration source) and hands it to the
//! dispatcher and telemetry initialisation.

mod defaults;
mod logging;

use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, default_exchange_logging, default_failure_detail, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use logging::{EXCHANGE_TARGET, ExchangeLogging, LogFormat, LogFormatParseError};

/// Runtime settings consumed by the dispatcher and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Filter expression handed to the tracing subscriber.
    pub log_filter: String,
    /// Output format of the tracing subscriber.
    pub log_format: LogFormat,
    /// Which exchanges the structured tracer's output lets through.
    pub exchange_logging: ExchangeLogging,
    /// Attach the rendered failure chain to faults that support a detail field.
    pub failure_detail: bool,
    /// Character encoding announced in XML responses when the transport
    /// reports none.
    pub default_encoding: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            exchange_logging: default_exchange_logging(),
            failure_detail: default_failure_detail(),
            default_encoding: None,
        }
    }
}

impl EngineConfig {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Full filter handed to the subscriber: the configured expression
    /// followed by the exchange logging directive.
    #[must_use]
    pub fn filter_directives(&self) -> String {
        let exchange = self.exchange_logging.directive();
        match self.log_filter.trim() {
            "" => exchange,
            filter => format!("{filter},{exchange}"),
        }
    }

    /// Returns the configured exchange logging.
    #[must_use]
    pub fn exchange_logging(&self) -> ExchangeLogging {
        self.exchange_logging
    }

    /// Returns the configured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether faults should carry diagnostic detail.
    #[must_use]
    pub fn failure_detail(&self) -> bool {
        self.failure_detail
    }

    /// Encoding to announce when the transport does not report one.
    #[must_use]
    pub fn default_encoding(&self) -> Option<&str> {
        self.default_encoding
            .as_deref()
            .filter(|encoding| !encoding.trim().is_empty())
    }
}
