//! Structured logging for applications and benches embedding netloom.
//!
//! Build, sort, save and import operations emit `tracing` spans; this module
//! installs a subscriber that prints them. Span close events carry timings,
//! which is how long builds report progress.
//!
//! | variable | effect |
//! |---|---|
//! | `RUST_LOG` | filter directives, default [`DEFAULT_DIRECTIVES`] |
//! | `NETLOOM_LOG_FORMAT` | `human` (default) or `json` |

use std::{env, str::FromStr, sync::OnceLock};

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "NETLOOM_LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "warn,netloom_core=info,netloom_providers_columnar=info";

static INSTALLED: OnceLock<LogFormat> = OnceLock::new();

/// Errors raised while configuring structured logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The format variable held invalid UTF-8.
    #[error("`NETLOOM_LOG_FORMAT` is not valid UTF-8")]
    InvalidUnicode,
    /// The format variable named an unknown format.
    #[error("unsupported log format `{provided}`; expected `human` or `json`")]
    UnsupportedFormat {
        /// Normalised value that was rejected.
        provided: String,
    },
    /// `RUST_LOG` held directives the filter rejected.
    #[error("invalid filter directives: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// Rendering of log lines.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Human,
    /// One JSON object per line with the current span list.
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnsupportedFormat {
                provided: other.to_owned(),
            }),
        }
    }
}

/// Subscriber settings resolved from the environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoggingConfig {
    format: LogFormat,
    directives: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            directives: DEFAULT_DIRECTIVES.to_owned(),
        }
    }
}

impl LoggingConfig {
    /// Reads `NETLOOM_LOG_FORMAT` and `RUST_LOG`.
    ///
    /// # Errors
    /// Returns [`LoggingError`] for an unreadable or unknown format.
    pub fn from_env() -> Result<Self, LoggingError> {
        let format = match env::var(LOG_FORMAT_ENV) {
            Ok(raw) => Some(raw),
            Err(env::VarError::NotPresent) => None,
            Err(env::VarError::NotUnicode(_)) => return Err(LoggingError::InvalidUnicode),
        };
        Self::from_values(format.as_deref(), env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
    }

    /// Resolves settings from raw variable values.
    ///
    /// # Errors
    /// Returns [`LoggingError::UnsupportedFormat`] for an unknown format.
    ///
    /// # Examples
    /// ```
    /// use netloom_core::logging::{LogFormat, LoggingConfig};
    ///
    /// let config = LoggingConfig::from_values(Some("json"), None)?;
    /// assert_eq!(config.format(), LogFormat::Json);
    /// assert!(config.directives().contains("netloom_core=info"));
    /// # Ok::<(), netloom_core::logging::LoggingError>(())
    /// ```
    pub fn from_values(format: Option<&str>, directives: Option<&str>) -> Result<Self, LoggingError> {
        let format = format.map(str::parse::<LogFormat>).transpose()?.unwrap_or_default();
        let directives = directives
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .unwrap_or(DEFAULT_DIRECTIVES)
            .to_owned();
        Ok(Self { format, directives })
    }

    /// Returns the output format.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Returns the filter directives.
    #[must_use]
    pub fn directives(&self) -> &str {
        &self.directives
    }

    /// Installs the subscriber globally.
    ///
    /// Returns `false` when another subscriber already owns the global slot;
    /// that subscriber is kept.
    ///
    /// # Errors
    /// Returns [`LoggingError::Filter`] when the directives do not parse.
    pub fn install(&self) -> Result<bool, LoggingError> {
        let filter = EnvFilter::try_new(&self.directives)?;
        let output = tracing_subscriber::fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr);
        let output = match self.format {
            LogFormat::Human => output.boxed(),
            LogFormat::Json => output.json().with_current_span(true).with_span_list(true).boxed(),
        };

        // The `log` slot may already be taken.
        let _ = LogTracer::init();
        Ok(tracing_subscriber::registry()
            .with(filter)
            .with(output)
            .try_init()
            .is_ok())
    }
}

/// Installs structured logging from the environment once per process.
///
/// Later calls return the format chosen by the first successful call.
///
/// # Errors
/// Returns [`LoggingError`] when the environment holds an unknown format or
/// invalid filter directives.
pub fn init_logging() -> Result<LogFormat, LoggingError> {
    if let Some(format) = INSTALLED.get() {
        return Ok(*format);
    }
    let config = LoggingConfig::from_env()?;
    if !config.install()? {
        tracing::debug!("a global subscriber was already installed");
    }
    Ok(*INSTALLED.get_or_init(|| config.format()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("human", LogFormat::Human)]
    #[case("Json", LogFormat::Json)]
    #[case(" json\n", LogFormat::Json)]
    fn formats_parse_case_insensitively(#[case] raw: &str, #[case] expected: LogFormat) {
        assert_eq!(raw.parse::<LogFormat>().expect("format parses"), expected);
    }

    #[test]
    fn unknown_formats_report_the_normalised_value() {
        let err = " Pretty ".parse::<LogFormat>().expect_err("pretty is unsupported");
        assert!(matches!(err, LoggingError::UnsupportedFormat { ref provided } if provided == "pretty"));
    }

    #[rstest]
    #[case(None, DEFAULT_DIRECTIVES)]
    #[case(Some("   "), DEFAULT_DIRECTIVES)]
    #[case(Some("netloom_core=debug"), "netloom_core=debug")]
    fn directives_fall_back_to_defaults(#[case] raw: Option<&str>, #[case] expected: &str) {
        let config = LoggingConfig::from_values(None, raw).expect("config resolves");
        assert_eq!(config.directives(), expected);
        assert_eq!(config.format(), LogFormat::Human);
    }

    #[test]
    fn invalid_directives_are_rejected_before_installing() {
        let config = LoggingConfig::from_values(None, Some("netloom_core=loud")).expect("config");
        assert!(matches!(config.install(), Err(LoggingError::Filter(_))));
    }

    #[test]
    fn init_logging_is_idempotent() {
        let first = init_logging().expect("logging initialises");
        let second = init_logging().expect("later calls reuse the first format");
        assert_eq!(first, second);
    }
}
