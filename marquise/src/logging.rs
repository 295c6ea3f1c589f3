//! Logging utilities and configuration for Marquise.
//!
//! Marquise logs through `tracing`. Connection lifecycle events are always
//! emitted at `debug`/`info`; payload previews are opt-in through
//! [`LogConfig::log_payloads`] because observation values may be large or
//! sensitive.

use tracing::Level;

/// Logging configuration for a Marquise client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base log level for Marquise components
    pub base_level: Level,
    /// Whether to include a preview of each observation's value in debug logs
    pub log_payloads: bool,
    /// Maximum length for logged payload previews
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: Level::INFO,
            log_payloads: false,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging.
    pub fn verbose() -> Self {
        Self {
            base_level: Level::DEBUG,
            log_payloads: true,
            max_field_length: 1024,
        }
    }

    /// Creates a minimal configuration for production with lowest overhead.
    pub fn production() -> Self {
        Self {
            base_level: Level::WARN,
            log_payloads: false,
            max_field_length: 128,
        }
    }
}

/// Debug-logs an observation payload if the config enables payload logging
/// at `DEBUG` or more verbose.
macro_rules! log_payload {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_payloads && $config.base_level >= tracing::Level::DEBUG {
            tracing::debug!($($arg)*);
        }
    };
}

pub(crate) use log_payload;

/// Truncates a string to at most `max_length` bytes, on a character boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }

    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Utilities for installing a `tracing` subscriber in applications using Marquise.
pub mod setup {
    use tracing::Level;

    use crate::error::{MarquiseError, Result};

    /// Configuration for the subscriber installed by [`init_logging`].
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for the application
        pub level: Level,
        /// Log level for Marquise specifically
        pub marquise_level: Level,
        /// Whether to use JSON output format
        pub json_format: bool,
        /// Environment filter override
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                marquise_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// Creates a configuration for production use.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                marquise_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        /// Creates a configuration for development use.
        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                marquise_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_marquise_level(mut self, level: Level) -> Self {
            self.marquise_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the environment filter string.
        pub fn env_filter(&self) -> String {
            if let Some(ref filter) = self.env_filter {
                filter.clone()
            } else {
                format!(
                    "{},marquise={}",
                    self.level.as_str().to_lowercase(),
                    self.marquise_level.as_str().to_lowercase()
                )
            }
        }
    }

    /// Installs a global `tracing` subscriber.
    ///
    /// `RUST_LOG` takes precedence over the configured filter when set.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::Configuration`] if the filter doesn't parse or
    /// a global subscriber is already installed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use marquise::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true))?;
    /// # Ok::<(), marquise::MarquiseError>(())
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(config.env_filter()).map_err(|e| {
                MarquiseError::Configuration {
                    message: format!("Invalid log filter {:?}: {e}", config.env_filter()),
                }
            })?,
        };

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| MarquiseError::Configuration {
                message: format!("Failed to install tracing subscriber: {e}"),
            })
    }
}
