use crate::logging::{ExchangeLogging, LogFormat};

/// Default filter: warnings from dependencies, lifecycle events from the
/// engine's own `dispatch`, `resolver`, `registry` and `client` targets.
pub const DEFAULT_LOG_FILTER: &str = "warn,rpcmux=info";

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Exchanges are logged only when they fail.
pub fn default_exchange_logging() -> ExchangeLogging {
    ExchangeLogging::Failures
}

/// Faults carry the failure chain as diagnostic detail unless disabled.
pub fn default_failure_detail() -> bool {
    true
}
