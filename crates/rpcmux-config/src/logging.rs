//! Log output settings and the engine's log targets.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Target the exchange tracer logs to.
pub const EXCHANGE_TARGET: &str = "rpcmux::trace";

/// Output format of the engine's diagnostic log.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened to the top level.
    #[default]
    Json,
    /// Single-line text.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] or [`ExchangeLogging`].
pub type LogFormatParseError = strum::ParseError;

/// Which request/response exchanges reach the log.
///
/// The structured tracer logs failed exchanges at `warn` and completed ones
/// at `debug`; this setting becomes a directive on [`EXCHANGE_TARGET`] that
/// overrides whatever the general filter says about that target.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExchangeLogging {
    /// No exchanges.
    Off,
    /// Only exchanges that ended in a failure.
    #[default]
    Failures,
    /// Every exchange, including request and response bodies.
    All,
}

impl ExchangeLogging {
    /// Filter directive applying this setting to [`EXCHANGE_TARGET`].
    #[must_use]
    pub fn directive(self) -> String {
        let level = match self {
            Self::Off => "off",
            Self::Failures => "warn",
            Self::All => "debug",
        };
        format!("{EXCHANGE_TARGET}={level}")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::json("json", LogFormat::Json)]
    #[case::compact("compact", LogFormat::Compact)]
    #[case::mixed_case("CoMpAcT", LogFormat::Compact)]
    fn parses_known_formats(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::from_str(input).expect("parse"), expected);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(LogFormat::from_str("yaml").is_err());
    }

    #[rstest]
    #[case::off(ExchangeLogging::Off, "rpcmux::trace=off")]
    #[case::failures(ExchangeLogging::Failures, "rpcmux::trace=warn")]
    #[case::all(ExchangeLogging::All, "rpcmux::trace=debug")]
    fn exchange_logging_targets_the_tracer(
        #[case] setting: ExchangeLogging,
        #[case] expected: &str,
    ) {
        assert_eq!(setting.directive(), expected);
    }

    #[test]
    fn exchange_logging_parses_from_text() {
        assert_eq!(
            ExchangeLogging::from_str("ALL").expect("parse"),
            ExchangeLogging::All
        );
    }
}
