//! Client configuration.
//!
//! [`MarquiseConfig`] names the broker and sets the flush interval the backend
//! batches on. It is validated before the backend is contacted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MarquiseError, Result};
use crate::logging::LogConfig;

/// Default delay between flushes of batched data points to the broker.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for opening a Marquise client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarquiseConfig {
    broker_address: String,
    #[serde(default = "default_flush_interval")]
    flush_interval: Duration,
    #[serde(skip)]
    log_config: LogConfig,
}

fn default_flush_interval() -> Duration {
    DEFAULT_FLUSH_INTERVAL
}

impl MarquiseConfig {
    /// Create a new MarquiseConfig for the given broker address (e.g. `tcp://localhost:4567`).
    pub fn new(broker_address: impl Into<String>) -> Self {
        Self {
            broker_address: broker_address.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            log_config: LogConfig::default(),
        }
    }

    /// Set the flush interval.
    ///
    /// Longer intervals improve throughput but widen the window of data
    /// points lost if the process dies before a flush. Sub-second intervals
    /// are allowed.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the flush interval from fractional seconds.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::Configuration`] for a negative or non-finite value.
    pub fn with_flush_interval_secs(self, secs: f64) -> Result<Self> {
        let interval =
            Duration::try_from_secs_f64(secs).map_err(|e| MarquiseError::Configuration {
                message: format!("Invalid flush interval {secs}: {e}"),
            })?;
        Ok(self.with_flush_interval(interval))
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn broker_address(&self) -> &str {
        &self.broker_address
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// The flush interval as the fractional seconds the backend takes.
    pub fn flush_interval_secs(&self) -> f64 {
        self.flush_interval.as_secs_f64()
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }

    /// Check the configuration before any backend call is made.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::Configuration`] if the broker address is empty
    /// or contains a NUL byte, or if the flush interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.broker_address.trim().is_empty() {
            return Err(MarquiseError::Configuration {
                message: "Broker address cannot be empty".to_string(),
            });
        }

        if self.broker_address.contains('\0') {
            return Err(MarquiseError::Configuration {
                message: "Broker address cannot contain NUL bytes".to_string(),
            });
        }

        if self.flush_interval.is_zero() {
            return Err(MarquiseError::Configuration {
                message: "Flush interval must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MarquiseConfig::new("tcp://localhost:4567");
        assert_eq!(config.broker_address(), "tcp://localhost:4567");
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.flush_interval_secs(), 5.0);
        assert_eq!(config.log_config(), &LogConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sub_second_flush_interval() {
        let config = MarquiseConfig::new("tcp://localhost:4567")
            .with_flush_interval_secs(0.05)
            .unwrap();
        assert!((config.flush_interval_secs() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_flush_interval_secs() {
        let config = MarquiseConfig::new("tcp://localhost:4567");
        assert!(config.clone().with_flush_interval_secs(-1.0).is_err());
        assert!(config.with_flush_interval_secs(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(MarquiseConfig::new("  ").validate().is_err());
        assert!(MarquiseConfig::new("tcp://\0").validate().is_err());

        let err = MarquiseConfig::new("tcp://localhost:4567")
            .with_flush_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, MarquiseError::Configuration { .. }));
    }

    #[test]
    fn test_config_deserializes_with_default_interval() {
        let config: MarquiseConfig =
            serde_json::from_str(r#"{"broker_address": "tcp://broker:5560"}"#).unwrap();
        assert_eq!(config.broker_address(), "tcp://broker:5560");
        assert_eq!(config.flush_interval(), DEFAULT_FLUSH_INTERVAL);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: MarquiseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
