//! Server configuration loaded from environment variables

use std::time::Duration;

use txanda_modules::{LivenessMonitorConfig, TelemetryConfig, TurnSchedulerConfig};

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

/// Coordinator server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub port: u16,

    /// Fixed control-slot duration in milliseconds
    pub slot_duration_ms: u64,

    /// Telemetry sampling period in milliseconds
    pub sample_period_ms: u64,

    /// Liveness monitor poll interval in milliseconds
    pub monitor_interval_ms: u64,

    /// Static bearer token for administrative routes; unset disables the
    /// gate (local development)
    pub admin_token: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            port: parse_env("TXANDA_PORT", 8080)?,
            slot_duration_ms: parse_env("TXANDA_SLOT_DURATION_MS", 30_000)?,
            sample_period_ms: parse_env("TXANDA_SAMPLE_PERIOD_MS", 250)?,
            monitor_interval_ms: parse_env("TXANDA_MONITOR_INTERVAL_MS", 2_000)?,
            admin_token: std::env::var("TXANDA_ADMIN_TOKEN").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.slot_duration_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "slot duration must be > 0".to_string(),
            ));
        }
        if self.sample_period_ms == 0 || self.sample_period_ms > self.slot_duration_ms {
            return Err(ConfigError::InvalidValue(
                "sample period must be > 0 and within the slot duration".to_string(),
            ));
        }
        if self.monitor_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "monitor interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> TurnSchedulerConfig {
        TurnSchedulerConfig {
            slot_duration: Duration::from_millis(self.slot_duration_ms),
            telemetry: TelemetryConfig {
                sample_period: Duration::from_millis(self.sample_period_ms),
                ..TelemetryConfig::default()
            },
        }
    }

    pub fn monitor_config(&self) -> LivenessMonitorConfig {
        LivenessMonitorConfig {
            poll_interval: Duration::from_millis(self.monitor_interval_ms),
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServerConfig {
        ServerConfig {
            port: 8080,
            slot_duration_ms: 30_000,
            sample_period_ms: 250,
            monitor_interval_ms: 2_000,
            admin_token: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_zero_slot_duration_rejected() {
        let mut config = base();
        config.slot_duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_period_must_fit_in_slot() {
        let mut config = base();
        config.sample_period_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_config_conversion() {
        let config = base().scheduler_config();
        assert_eq!(config.slot_duration, Duration::from_secs(30));
        assert_eq!(config.telemetry.sample_period, Duration::from_millis(250));
    }
}
