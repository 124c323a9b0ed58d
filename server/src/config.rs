//! Typed runtime configuration.
//!
//! Every knob is read once at startup from the environment into a plain
//! struct; nothing downstream touches environment variables. Missing keys
//! fall back to development defaults, malformed values fail startup.

use orderline_amqp::{BrokerConfig, DEFAULT_MAX_IN_FLIGHT};
use orderline_core::OrderProcessor;
use std::env;
use std::ops::RangeInclusive;

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was set to a value we cannot use.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Runtime configuration for the Orderline service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Simulated preparation delay, in whole seconds.
    pub prep_delay_secs: RangeInclusive<u64>,
    /// Maximum number of deliveries processed concurrently.
    pub max_in_flight: usize,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but cannot
    /// be parsed, or when the preparation delay range is inverted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0");
        let port = parse_or("PORT", 8080)?;

        let broker = BrokerConfig {
            host: env_or("RABBITMQ_HOST", "localhost"),
            port: parse_or("RABBITMQ_PORT", 5672)?,
            username: env_or("RABBITMQ_USERNAME", "guest"),
            password: env_or("RABBITMQ_PASSWORD", "guest"),
            default_queue: env_or("RABBITMQ_DEFAULT_QUEUE", "orders"),
        };

        let default_delay = OrderProcessor::DEFAULT_PREP_DELAY_SECS;
        let delay_min: u64 = parse_or("PREP_DELAY_MIN_SECS", *default_delay.start())?;
        let delay_max: u64 = parse_or("PREP_DELAY_MAX_SECS", *default_delay.end())?;
        if delay_min > delay_max {
            return Err(ConfigError::Invalid {
                key: "PREP_DELAY_MIN_SECS".to_string(),
                value: delay_min.to_string(),
                reason: format!("exceeds PREP_DELAY_MAX_SECS ({delay_max})"),
            });
        }

        let max_in_flight: usize = parse_or("MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT)?;
        if max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_IN_FLIGHT".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            broker,
            prep_delay_secs: delay_min..=delay_max,
            max_in_flight,
        })
    }

    /// Address the HTTP listener binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
